/// `TklockSm` (spec.md §4.J) — the device-lock policy engine.
///
/// Every external input arrives through an `on_*` setter; each setter
/// returns the [`TklockAction`]s the caller must apply (publish a
/// datapipe, schedule/cancel a timer, issue a grab request, write a
/// sysfs node). This mirrors [`super::grab::InputGrabState`]'s shape —
/// a plain mutable struct whose callbacks are data, not live references
/// — so the machine is testable without a running [`super::datapipe::Datapipe`]
/// or [`super::timers::Scheduler`]; the main loop is the only thing that
/// ever turns a `TklockAction` into a side effect.
///
/// Timers are named by `&'static str` rather than held as live
/// `TimerId`s, resolving the cyclic-reference concern of spec.md §9
/// ("TklockSM <-> InputGrabSM <-> IoMonitor... never with reciprocal
/// owning pointers") without an id arena: the caller owns the mapping
/// from name to a real `Scheduler` timer and calls `on_timer_fired` back
/// in with the same name.
use bitflags::bitflags;

use super::config::{LidAction, Settings};
use super::submode::Submode;

const TIMER_AUTOLOCK: &str = "autolock";
const TIMER_DIM_TO_BLANK: &str = "dim_to_blank";
const TIMER_POCKET_MODE: &str = "pocket_mode";
const TIMER_VISUAL_BLANK: &str = "visual_tklock_blank";
const TIMER_ORIENTATION_PRIME: &str = "orientation_prime";
const TIMER_DOUBLETAP_INHIBIT: &str = "doubletap_proximity_inhibit";
const TIMER_DOUBLETAP_UNLOCK: &str = "doubletap_unlock";
const RECAL_TIMER_PREFIX: &str = "recalibrate#";
const RECAL_TIMER_NAMES: [&str; 5] = [
    "recalibrate#1",
    "recalibrate#2",
    "recalibrate#3",
    "recalibrate#4",
    "recalibrate#5",
];
const RECAL_SCHEDULE_MS: [u64; 5] = [2_000, 4_000, 8_000, 16_000, 30_000];

const POCKET_MODE_DELAY_MS: u64 = 5_000;
const DIM_DELAY_DEFAULT_MS: u64 = 5_000;
const VISUAL_TKLOCK_BLANK_DELAY_MS: u64 = 3_000;
const ORIENTATION_PRIME_DELAY_MS: u64 = 1_000;
const DOUBLETAP_PROXIMITY_INHIBIT_DELAY_MS: u64 = 1_200;
const DOUBLETAP_UNLOCK_DELAY_MS: u64 = 1_500;

bitflags! {
    /// Which covers closing is still allowed to auto-relock a manually
    /// released tklock (spec.md §4.J "Auto-relock triggers").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AutorelockTriggers: u8 {
        const KEYBOARD_SLIDE_CLOSE = 0b001;
        const LENS_COVER_CLOSE     = 0b010;
        const PROXIMITY            = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    Undef,
    Off,
    LpmOff,
    LpmOn,
    Dim,
    On,
    PowerUp,
    PowerDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    User,
    ActDead,
    Shutdown,
    Reboot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    None,
    Ringing,
    Active,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmUiState {
    Off,
    Visible,
    Ringing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverState {
    Undef,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Undefined,
    FaceUp,
    FaceDown,
    Other,
}

/// Lock-policy knobs that spec.md §6 describes narratively but does not
/// enumerate among the live settings store keys; kept as constructor
/// input here rather than grown onto [`Settings`] (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubletapWakePolicy {
    NoAction,
    ShowVisual,
    UnlockAfterDelay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TklockVariant {
    Unlocked,
    Locked,
    Visual,
    LpmOn,
    LpmOff,
}

/// One effect the caller must carry out. Never constructed to "look
/// busy": every variant here is produced by at least one policy rule
/// below and consumed by at least one test.
#[derive(Debug, Clone, PartialEq)]
pub enum TklockAction {
    SetSubmode(Submode),
    SetUiVariant(TklockVariant),
    EmitTklockModeInd(bool),
    EmitAlarmFeedback,
    EmitCallFeedback,
    RequestTouchGrab(bool),
    RequestKeypadGrab(bool),
    RequestDisplayDim,
    RequestDisplayBlank,
    RequestDisplayUnblank,
    ScheduleTimer { name: &'static str, delay_ms: u64 },
    CancelTimer { name: &'static str },
    SetDoubletapGesture(bool),
    RecalibrateTouch,
}

pub struct TklockSm {
    settings: Settings,
    doubletap_wake_policy: DoubletapWakePolicy,

    display_state: DisplayState,
    system_state: SystemState,
    call_state: CallState,
    alarm_ui_state: AlarmUiState,
    proximity: CoverState,
    lid: CoverState,
    keyboard_slide: CoverState,
    lens_cover: CoverState,
    orientation: Orientation,

    submode: Submode,
    autorelock_triggers: AutorelockTriggers,

    saved_pre_proximity_submode: Option<Submode>,
    flip_face_up_primed: bool,
    pocket_inhibit_doubletap: bool,
    visual_tklock_active: bool,
    doubletap_hw_supported: bool,
    compositor_alive: bool,
}

impl TklockSm {
    pub fn new(settings: Settings) -> Self {
        Self::with_doubletap_policy(settings, DoubletapWakePolicy::ShowVisual)
    }

    pub fn with_doubletap_policy(settings: Settings, doubletap_wake_policy: DoubletapWakePolicy) -> Self {
        Self {
            settings,
            doubletap_wake_policy,
            display_state: DisplayState::Undef,
            system_state: SystemState::User,
            call_state: CallState::None,
            alarm_ui_state: AlarmUiState::Off,
            proximity: CoverState::Undef,
            lid: CoverState::Undef,
            keyboard_slide: CoverState::Undef,
            lens_cover: CoverState::Undef,
            orientation: Orientation::Undefined,
            submode: Submode::BOOTUP,
            autorelock_triggers: AutorelockTriggers::all(),
            saved_pre_proximity_submode: None,
            flip_face_up_primed: false,
            pocket_inhibit_doubletap: false,
            visual_tklock_active: false,
            doubletap_hw_supported: false,
            compositor_alive: true,
        }
    }

    pub fn submode(&self) -> Submode {
        self.submode
    }

    pub fn is_locked(&self) -> bool {
        self.submode.contains(Submode::TKLOCK)
    }

    pub fn autorelock_triggers(&self) -> AutorelockTriggers {
        self.autorelock_triggers
    }

    fn display_is_off(&self) -> bool {
        matches!(self.display_state, DisplayState::Off | DisplayState::LpmOff | DisplayState::LpmOn)
    }

    fn engage_tklock(&mut self, actions: &mut Vec<TklockAction>) {
        if self.submode.contains(Submode::TKLOCK) {
            return;
        }
        self.submode.insert(Submode::TKLOCK);
        self.autorelock_triggers = AutorelockTriggers::all();
        actions.push(TklockAction::SetSubmode(self.submode));
        actions.push(TklockAction::SetUiVariant(TklockVariant::Locked));
        actions.push(TklockAction::EmitTklockModeInd(true));
        actions.push(TklockAction::RequestTouchGrab(true));
        actions.push(TklockAction::RequestKeypadGrab(true));
        self.schedule_dim_blank_policy(actions);
    }

    fn disengage_tklock(&mut self, actions: &mut Vec<TklockAction>) {
        if !self.submode.contains(Submode::TKLOCK) {
            return;
        }
        self.submode
            .remove(Submode::TKLOCK | Submode::VISUAL_TKLOCK | Submode::PROXIMITY_TKLOCK | Submode::POCKET);
        self.visual_tklock_active = false;
        actions.push(TklockAction::SetSubmode(self.submode));
        actions.push(TklockAction::SetUiVariant(TklockVariant::Unlocked));
        actions.push(TklockAction::EmitTklockModeInd(false));
        actions.push(TklockAction::RequestTouchGrab(false));
        actions.push(TklockAction::RequestKeypadGrab(false));
        actions.push(TklockAction::CancelTimer { name: TIMER_DIM_TO_BLANK });
        actions.push(TklockAction::CancelTimer { name: TIMER_VISUAL_BLANK });
    }

    fn schedule_dim_blank_policy(&self, actions: &mut Vec<TklockAction>) {
        if self.settings.tklock_blank_disable != 0 {
            return;
        }
        actions.push(TklockAction::RequestDisplayDim);
        actions.push(TklockAction::ScheduleTimer { name: TIMER_DIM_TO_BLANK, delay_ms: DIM_DELAY_DEFAULT_MS });
    }

    /// A user-initiated unlock (distinct from a policy-driven one):
    /// disarms auto-relock until the next `engage_tklock` re-arms it
    /// (spec.md §4.J "disabled when tklock is manually released").
    pub fn manual_unlock(&mut self) -> Vec<TklockAction> {
        let mut actions = Vec::new();
        self.disengage_tklock(&mut actions);
        self.autorelock_triggers = AutorelockTriggers::empty();
        actions
    }

    fn auto_lock_should_engage(&self) -> bool {
        self.settings.touchscreen_keypad_autolock_enabled
            && self.system_state == SystemState::User
            && !self.submode.contains(Submode::BOOTUP)
            && !matches!(self.alarm_ui_state, AlarmUiState::Visible | AlarmUiState::Ringing)
            && !matches!(self.call_state, CallState::Ringing | CallState::Active)
            && self.keyboard_slide != CoverState::Open
    }

    pub fn on_display_state(&mut self, new: DisplayState) -> Vec<TklockAction> {
        let old = self.display_state;
        self.display_state = new;
        let mut actions = Vec::new();

        let was_off = matches!(old, DisplayState::Off | DisplayState::LpmOff | DisplayState::LpmOn);
        let now_off = matches!(new, DisplayState::Off | DisplayState::LpmOff | DisplayState::LpmOn);

        if now_off && !was_off && self.auto_lock_should_engage() {
            actions.push(TklockAction::ScheduleTimer {
                name: TIMER_AUTOLOCK,
                delay_ms: self.settings.autolock_delay_ms as u64,
            });
        }
        if was_off && !now_off {
            actions.push(TklockAction::CancelTimer { name: TIMER_AUTOLOCK });
        }

        if self.submode.contains(Submode::TKLOCK) {
            match new {
                DisplayState::LpmOn => actions.push(TklockAction::SetUiVariant(TklockVariant::LpmOn)),
                DisplayState::LpmOff => actions.push(TklockAction::SetUiVariant(TklockVariant::LpmOff)),
                DisplayState::On | DisplayState::Dim if was_off => {
                    let variant = if self.visual_tklock_active {
                        TklockVariant::Visual
                    } else {
                        TklockVariant::Locked
                    };
                    actions.push(TklockAction::SetUiVariant(variant));
                }
                _ => {}
            }
        }
        actions
    }

    pub fn on_system_state(&mut self, new: SystemState) -> Vec<TklockAction> {
        self.system_state = new;
        let mut actions = Vec::new();
        if new == SystemState::User && self.submode.contains(Submode::BOOTUP) {
            self.submode.remove(Submode::BOOTUP);
            actions.push(TklockAction::SetSubmode(self.submode));
        }
        actions
    }

    pub fn on_call_state(&mut self, new: CallState) {
        self.call_state = new;
    }

    pub fn on_alarm_ui_state(&mut self, new: AlarmUiState) {
        self.alarm_ui_state = new;
    }

    /// Proximity-locking (spec.md §4.J): Open -> Closed during a call
    /// saves the current submode and engages `ProximityTklock`; the
    /// first Closed -> Open restores exactly that saved submode,
    /// matching the universal invariant of spec.md §8. Open -> Closed
    /// while the display is off instead arms the pocket-mode timer.
    pub fn on_proximity(&mut self, new: CoverState) -> Vec<TklockAction> {
        let old = self.proximity;
        self.proximity = new;
        let mut actions = Vec::new();
        let call_active_ish = matches!(self.call_state, CallState::Ringing | CallState::Active);

        if old == CoverState::Open && new == CoverState::Closed {
            if call_active_ish {
                self.saved_pre_proximity_submode = Some(self.submode);
                self.submode.insert(Submode::PROXIMITY_TKLOCK | Submode::TKLOCK);
                actions.push(TklockAction::SetSubmode(self.submode));
                actions.push(TklockAction::RequestTouchGrab(true));
            } else if self.display_is_off() {
                actions.push(TklockAction::ScheduleTimer {
                    name: TIMER_POCKET_MODE,
                    delay_ms: POCKET_MODE_DELAY_MS,
                });
            }
            if self.display_state == DisplayState::On {
                actions.push(TklockAction::ScheduleTimer {
                    name: TIMER_DOUBLETAP_INHIBIT,
                    delay_ms: DOUBLETAP_PROXIMITY_INHIBIT_DELAY_MS,
                });
            }
            return actions;
        }

        if old == CoverState::Closed && new == CoverState::Open {
            actions.push(TklockAction::CancelTimer { name: TIMER_POCKET_MODE });
            actions.push(TklockAction::CancelTimer { name: TIMER_DOUBLETAP_INHIBIT });
            self.pocket_inhibit_doubletap = false;

            if self.submode.contains(Submode::POCKET) {
                self.submode.remove(Submode::POCKET);
                actions.push(TklockAction::SetSubmode(self.submode));
            }
            if self.submode.contains(Submode::PROXIMITY_TKLOCK) {
                match self.saved_pre_proximity_submode.take() {
                    Some(saved) => self.submode = saved,
                    None => self.submode.remove(Submode::PROXIMITY_TKLOCK),
                }
                actions.push(TklockAction::SetSubmode(self.submode));
                actions.push(TklockAction::RequestTouchGrab(self.submode.contains(Submode::TKLOCK)));
            }
        }
        actions
    }

    pub fn on_lid(&mut self, new: CoverState) -> Vec<TklockAction> {
        let old = self.lid;
        self.lid = new;
        let mut actions = Vec::new();
        if !self.settings.lid_sensor_enabled {
            return actions;
        }
        if old == CoverState::Open && new == CoverState::Closed {
            self.apply_lid_action(self.settings.lid_close_actions, true, &mut actions);
        } else if old == CoverState::Closed && new == CoverState::Open {
            self.apply_lid_action(self.settings.lid_open_actions, false, &mut actions);
        }
        actions
    }

    fn apply_lid_action(&mut self, action: LidAction, closing: bool, actions: &mut Vec<TklockAction>) {
        match action {
            LidAction::None => {}
            LidAction::BlankOrUnblank => {
                actions.push(if closing {
                    TklockAction::RequestDisplayBlank
                } else {
                    TklockAction::RequestDisplayUnblank
                });
            }
            LidAction::LockOrUnlock => {
                if closing {
                    self.engage_tklock(actions);
                } else {
                    self.disengage_tklock(actions);
                }
            }
        }
    }

    pub fn on_keyboard_slide(&mut self, new: CoverState) -> Vec<TklockAction> {
        let old = self.keyboard_slide;
        self.keyboard_slide = new;
        let mut actions = Vec::new();
        if old == CoverState::Open
            && new == CoverState::Closed
            && !self.submode.contains(Submode::TKLOCK)
            && self.autorelock_triggers.contains(AutorelockTriggers::KEYBOARD_SLIDE_CLOSE)
        {
            self.engage_tklock(&mut actions);
        }
        actions
    }

    pub fn on_lens_cover(&mut self, new: CoverState) -> Vec<TklockAction> {
        let old = self.lens_cover;
        self.lens_cover = new;
        let mut actions = Vec::new();
        if old == CoverState::Open
            && new == CoverState::Closed
            && !self.submode.contains(Submode::TKLOCK)
            && self.autorelock_triggers.contains(AutorelockTriggers::LENS_COVER_CLOSE)
        {
            self.engage_tklock(&mut actions);
        }
        actions
    }

    /// Flip-over gesture (spec.md §4.J), active only while the display is
    /// on and either an alarm or an incoming call is presented.
    /// Undefined -> FaceUp arms a 1 s debounce (`TIMER_ORIENTATION_PRIME`);
    /// only once that timer has fired does a later FaceDown transition
    /// count as the gesture.
    pub fn on_orientation(&mut self, new: Orientation) -> Vec<TklockAction> {
        let old = self.orientation;
        self.orientation = new;
        let mut actions = Vec::new();

        let flip_context = self.display_state == DisplayState::On
            && (matches!(self.alarm_ui_state, AlarmUiState::Ringing | AlarmUiState::Visible)
                || self.call_state == CallState::Ringing);

        if !flip_context {
            self.flip_face_up_primed = false;
            return actions;
        }

        match (old, new) {
            (Orientation::Undefined, Orientation::FaceUp) => {
                self.flip_face_up_primed = false;
                actions.push(TklockAction::ScheduleTimer {
                    name: TIMER_ORIENTATION_PRIME,
                    delay_ms: ORIENTATION_PRIME_DELAY_MS,
                });
            }
            (_, Orientation::FaceDown) if self.flip_face_up_primed => {
                self.flip_face_up_primed = false;
                if matches!(self.alarm_ui_state, AlarmUiState::Ringing | AlarmUiState::Visible) {
                    actions.push(TklockAction::EmitAlarmFeedback);
                } else {
                    actions.push(TklockAction::EmitCallFeedback);
                }
            }
            _ => {}
        }
        actions
    }

    pub fn on_wake_key_pressed(&mut self) -> Vec<TklockAction> {
        let mut actions = Vec::new();
        if self.submode.contains(Submode::TKLOCK) {
            if !self.submode.contains(Submode::VISUAL_TKLOCK) {
                self.submode.insert(Submode::VISUAL_TKLOCK);
                self.visual_tklock_active = true;
                actions.push(TklockAction::SetSubmode(self.submode));
                actions.push(TklockAction::SetUiVariant(TklockVariant::Visual));
            }
            actions.push(TklockAction::ScheduleTimer {
                name: TIMER_VISUAL_BLANK,
                delay_ms: VISUAL_TKLOCK_BLANK_DELAY_MS,
            });
        }
        actions
    }

    pub fn on_usb_cable(&mut self, _connected: bool) -> Vec<TklockAction> {
        self.on_wake_key_pressed()
    }

    pub fn on_jack_sense(&mut self, _inserted: bool) -> Vec<TklockAction> {
        self.on_wake_key_pressed()
    }

    /// Double-tap-to-wake policy (spec.md §4.J); suppressed entirely
    /// while a proximity-driven pocket inhibit is active.
    pub fn on_doubletap_gesture(&mut self) -> Vec<TklockAction> {
        if self.pocket_inhibit_doubletap {
            return Vec::new();
        }
        match self.doubletap_wake_policy {
            DoubletapWakePolicy::NoAction => Vec::new(),
            DoubletapWakePolicy::ShowVisual => self.on_wake_key_pressed(),
            DoubletapWakePolicy::UnlockAfterDelay => vec![TklockAction::ScheduleTimer {
                name: TIMER_DOUBLETAP_UNLOCK,
                delay_ms: DOUBLETAP_UNLOCK_DELAY_MS,
            }],
        }
    }

    pub fn on_doubletap_enabled(&mut self, hw_supported: bool) -> Vec<TklockAction> {
        self.doubletap_hw_supported = hw_supported;
        let mut actions = Vec::new();
        if !hw_supported {
            return actions;
        }
        actions.push(TklockAction::SetDoubletapGesture(true));
        for (name, delay_ms) in RECAL_TIMER_NAMES.iter().zip(RECAL_SCHEDULE_MS) {
            actions.push(TklockAction::ScheduleTimer { name, delay_ms });
        }
        actions
    }

    /// Piggy-backs touch recalibration on the system heartbeat while the
    /// display is On/Dim, once the initial post-enable schedule has run
    /// its course (spec.md §4.J).
    pub fn on_heartbeat(&self) -> Vec<TklockAction> {
        let mut actions = Vec::new();
        if self.doubletap_hw_supported && matches!(self.display_state, DisplayState::On | DisplayState::Dim) {
            actions.push(TklockAction::RecalibrateTouch);
        }
        actions
    }

    /// A fire-and-forget compositor call's liveness watch concluding the
    /// compositor is gone forces an unlock (spec.md §7 "Compositor
    /// disappeared while locked: force unlock"), since an engaged tklock
    /// with no compositor to show it would otherwise strand the device.
    pub fn on_compositor_liveness(&mut self, alive: bool) -> Vec<TklockAction> {
        self.compositor_alive = alive;
        let mut actions = Vec::new();
        if !alive && self.submode.contains(Submode::TKLOCK) {
            self.disengage_tklock(&mut actions);
        }
        actions
    }

    pub fn on_timer_fired(&mut self, name: &str) -> Vec<TklockAction> {
        let mut actions = Vec::new();
        match name {
            TIMER_AUTOLOCK => self.engage_tklock(&mut actions),
            TIMER_DIM_TO_BLANK => actions.push(TklockAction::RequestDisplayBlank),
            TIMER_POCKET_MODE => {
                self.submode.insert(Submode::POCKET);
                self.pocket_inhibit_doubletap = true;
                actions.push(TklockAction::SetSubmode(self.submode));
            }
            TIMER_VISUAL_BLANK => {
                if self.submode.contains(Submode::VISUAL_TKLOCK) {
                    self.submode.remove(Submode::VISUAL_TKLOCK);
                    self.visual_tklock_active = false;
                    actions.push(TklockAction::SetSubmode(self.submode));
                    actions.push(TklockAction::SetUiVariant(TklockVariant::Locked));
                    actions.push(TklockAction::RequestDisplayBlank);
                }
            }
            TIMER_ORIENTATION_PRIME => {
                if self.orientation == Orientation::FaceUp {
                    self.flip_face_up_primed = true;
                }
            }
            TIMER_DOUBLETAP_INHIBIT => {
                if self.proximity == CoverState::Closed {
                    self.pocket_inhibit_doubletap = true;
                }
            }
            TIMER_DOUBLETAP_UNLOCK => self.disengage_tklock(&mut actions),
            other if other.starts_with(RECAL_TIMER_PREFIX) => {
                actions.push(TklockAction::RecalibrateTouch);
            }
            _ => {}
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sm() -> TklockSm {
        let mut settings = Settings::default();
        settings.autolock_delay_ms = 30_000;
        let mut machine = TklockSm::new(settings);
        // Boot completes before every test scenario begins.
        machine.on_system_state(SystemState::User);
        machine
    }

    #[test]
    fn scenario_4_flip_over_during_alarm_emits_one_feedback() {
        let mut m = sm();
        m.on_display_state(DisplayState::On);
        m.on_alarm_ui_state(AlarmUiState::Ringing);

        let actions = m.on_orientation(Orientation::FaceUp);
        assert_eq!(
            actions,
            vec![TklockAction::ScheduleTimer { name: "orientation_prime", delay_ms: 1_000 }]
        );

        // Held 1.2s: the debounce timer fires before the flip completes.
        let fired = m.on_timer_fired("orientation_prime");
        assert!(fired.is_empty());

        let flipped = m.on_orientation(Orientation::FaceDown);
        assert_eq!(flipped, vec![TklockAction::EmitAlarmFeedback]);

        // A second flip without returning to FaceUp produces nothing more.
        let again = m.on_orientation(Orientation::FaceUp);
        assert!(!again.is_empty()); // re-arms the debounce...
        let again_down = m.on_orientation(Orientation::FaceDown);
        assert!(again_down.is_empty(), "debounce was never re-primed by a timer fire");
    }

    #[test]
    fn flip_over_outside_alarm_or_ring_context_is_inert() {
        let mut m = sm();
        m.on_display_state(DisplayState::On);
        // No alarm, no call.
        assert!(m.on_orientation(Orientation::FaceUp).is_empty());
        assert!(m.on_timer_fired("orientation_prime").is_empty());
        assert!(m.on_orientation(Orientation::FaceDown).is_empty());
    }

    #[test]
    fn universal_invariant_proximity_restores_saved_submode_on_first_open() {
        let mut m = sm();
        m.on_call_state(CallState::Active);
        assert!(!m.is_locked());

        let closed = m.on_proximity(CoverState::Closed);
        assert!(closed.contains(&TklockAction::RequestTouchGrab(true)));
        assert!(m.submode().contains(Submode::PROXIMITY_TKLOCK));
        assert!(m.is_locked());

        let opened = m.on_proximity(CoverState::Open);
        assert!(!m.submode().contains(Submode::PROXIMITY_TKLOCK));
        assert!(!m.is_locked(), "submode must be restored to the pre-proximity (unlocked) state");
        assert!(opened.contains(&TklockAction::RequestTouchGrab(false)));
    }

    #[test]
    fn proximity_close_while_locked_restores_locked_state() {
        let mut m = sm();
        m.engage_tklock_for_test();
        m.on_call_state(CallState::Ringing);
        m.on_proximity(CoverState::Closed);
        assert!(m.is_locked());
        m.on_proximity(CoverState::Open);
        assert!(m.is_locked(), "was already locked before proximity closed, stays locked after");
        assert!(!m.submode().contains(Submode::PROXIMITY_TKLOCK));
    }

    #[test]
    fn proximity_close_while_display_off_arms_pocket_timer() {
        let mut m = sm();
        m.on_display_state(DisplayState::Off);
        let actions = m.on_proximity(CoverState::Closed);
        assert!(actions.contains(&TklockAction::ScheduleTimer { name: "pocket_mode", delay_ms: 5_000 }));

        let fired = m.on_timer_fired("pocket_mode");
        assert!(fired.contains(&TklockAction::SetSubmode(m.submode())));
        assert!(m.submode().contains(Submode::POCKET));

        let opened = m.on_proximity(CoverState::Open);
        assert!(!m.submode().contains(Submode::POCKET));
        assert!(opened.contains(&TklockAction::CancelTimer { name: "pocket_mode" }));
    }

    #[test]
    fn autolock_engages_after_blank_delay_and_schedules_dim() {
        let mut m = sm();
        m.on_display_state(DisplayState::On);
        let on_blank = m.on_display_state(DisplayState::Off);
        assert!(on_blank.contains(&TklockAction::ScheduleTimer { name: "autolock", delay_ms: 30_000 }));

        let fired = m.on_timer_fired("autolock");
        assert!(m.is_locked());
        assert!(fired.contains(&TklockAction::RequestDisplayDim));
        assert!(fired.contains(&TklockAction::ScheduleTimer { name: "dim_to_blank", delay_ms: 5_000 }));

        let dim_fired = m.on_timer_fired("dim_to_blank");
        assert_eq!(dim_fired, vec![TklockAction::RequestDisplayBlank]);
    }

    #[test]
    fn autolock_does_not_engage_during_an_active_call() {
        let mut m = sm();
        m.on_call_state(CallState::Active);
        m.on_display_state(DisplayState::On);
        let actions = m.on_display_state(DisplayState::Off);
        assert!(actions.is_empty());
    }

    #[test]
    fn autorelock_trigger_disabled_after_manual_unlock_then_rearmed_on_next_engage() {
        let mut m = sm();
        m.engage_tklock_for_test();
        m.manual_unlock();
        assert_eq!(m.autorelock_triggers(), AutorelockTriggers::empty());

        // Slide closing must NOT re-lock while the trigger is disarmed.
        m.on_keyboard_slide(CoverState::Open);
        assert!(m.on_keyboard_slide(CoverState::Closed).is_empty());
        assert!(!m.is_locked());

        m.engage_tklock_for_test();
        assert_eq!(m.autorelock_triggers(), AutorelockTriggers::all());
    }

    #[test]
    fn lens_cover_close_relocks_when_trigger_is_armed() {
        let mut m = sm();
        m.engage_tklock_for_test();
        m.manual_unlock();
        // Re-arm without going through manual_unlock's disarm.
        m.set_autorelock_triggers_for_test(AutorelockTriggers::LENS_COVER_CLOSE);
        m.on_lens_cover(CoverState::Open);
        let actions = m.on_lens_cover(CoverState::Closed);
        assert!(m.is_locked());
        assert!(actions.contains(&TklockAction::EmitTklockModeInd(true)));
    }

    #[test]
    fn wake_key_shows_visual_tklock_and_auto_blanks() {
        let mut m = sm();
        m.engage_tklock_for_test();
        let actions = m.on_wake_key_pressed();
        assert!(m.submode().contains(Submode::VISUAL_TKLOCK));
        assert!(actions.contains(&TklockAction::SetUiVariant(TklockVariant::Visual)));

        let fired = m.on_timer_fired("visual_tklock_blank");
        assert!(!m.submode().contains(Submode::VISUAL_TKLOCK));
        assert!(fired.contains(&TklockAction::RequestDisplayBlank));
    }

    #[test]
    fn doubletap_gesture_shows_visual_tklock_by_default_policy() {
        let mut m = sm();
        m.engage_tklock_for_test();
        let actions = m.on_doubletap_gesture();
        assert!(actions.contains(&TklockAction::SetUiVariant(TklockVariant::Visual)));
    }

    #[test]
    fn doubletap_gesture_suppressed_during_pocket_inhibit() {
        let mut m = sm();
        m.engage_tklock_for_test();
        m.on_display_state(DisplayState::Off);
        m.on_proximity(CoverState::Closed);
        m.on_timer_fired("pocket_mode");
        assert!(m.on_doubletap_gesture().is_empty());
    }

    #[test]
    fn compositor_disappearing_while_locked_forces_unlock() {
        let mut m = sm();
        m.engage_tklock_for_test();
        let actions = m.on_compositor_liveness(false);
        assert!(!m.is_locked());
        assert!(actions.contains(&TklockAction::EmitTklockModeInd(false)));
    }

    #[test]
    fn lid_close_action_locks_and_open_action_unlocks() {
        let mut m = sm();
        m.on_lid(CoverState::Open);
        let closed = m.on_lid(CoverState::Closed);
        assert!(m.is_locked());
        assert!(closed.contains(&TklockAction::EmitTklockModeInd(true)));

        let opened = m.on_lid(CoverState::Open);
        assert!(!m.is_locked());
        assert!(opened.contains(&TklockAction::EmitTklockModeInd(false)));
    }

    #[test]
    fn doubletap_recalibration_schedule_fires_five_pokes_then_heartbeat_piggybacks() {
        let mut m = sm();
        let actions = m.on_doubletap_enabled(true);
        assert_eq!(actions.len(), 6); // 1 sysfs enable + 5 scheduled pokes
        assert!(actions.contains(&TklockAction::ScheduleTimer { name: "recalibrate#1", delay_ms: 2_000 }));
        assert!(actions.contains(&TklockAction::ScheduleTimer { name: "recalibrate#5", delay_ms: 30_000 }));
        assert_eq!(m.on_timer_fired("recalibrate#3"), vec![TklockAction::RecalibrateTouch]);

        m.on_display_state(DisplayState::On);
        assert_eq!(m.on_heartbeat(), vec![TklockAction::RecalibrateTouch]);
    }

    // Test-only helpers exposing otherwise-private transitions, kept
    // beside the tests that need them rather than widening the public
    // API for production callers.
    impl TklockSm {
        fn engage_tklock_for_test(&mut self) -> Vec<TklockAction> {
            let mut actions = Vec::new();
            self.engage_tklock(&mut actions);
            actions
        }

        fn set_autorelock_triggers_for_test(&mut self, triggers: AutorelockTriggers) {
            self.autorelock_triggers = triggers;
        }
    }
}
