/// Daemon lifecycle and the `poll(2)` reactor loop (spec.md §5, §9).
///
/// Every device fd and the settling of the timer heap are multiplexed
/// through a single blocking `poll(2)` call — there is no worker thread
/// and no async runtime. [`TklockSm`]/[`InputGrabState`] never see a live
/// timer or datapipe; they hand back the actions they want carried out,
/// and this module is the only place those actions become an
/// `EVIOCGRAB`, a sysfs write, or a scheduled wakeup. This is the
/// concrete realization of §9's "never with reciprocal owning pointers":
/// `App` owns everything outright, and every cross-component reference
/// is either a returned action or a shared `Cell`/`RefCell` flag.
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use anyhow::{bail, Result};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, info, warn};

use crate::core::config::AppConfig;
use crate::core::datapipe::Datapipe;
use crate::core::evdev::codes::{
    KEY_CAMERA, SW_CAMERA_LENS_COVER, SW_FRONT_PROXIMITY, SW_HEADPHONE_INSERT, SW_KEYPAD_SLIDE,
    SW_LID, SW_LINEOUT_INSERT, SW_MICROPHONE_INSERT, SW_VIDEOOUT_INSERT,
};
use crate::core::evdev::{DeviceRole, InputEvent};
use crate::core::grab_domains::{apply_grab_to_devices, KpGrab, TsGrab};
use crate::core::monitor::{KeySwitchSignal, TouchscreenSignal};
use crate::core::permissions::{self, PermissionStatus};
use crate::core::registry::{self, DeviceRegistry};
use crate::core::submode::Submode;
use crate::core::sysfs;
use crate::core::timers::{Scheduler, TimerId};
use crate::core::tklock::{CoverState, Settings, SystemState, TklockAction, TklockSm};

const DEVICE_RESCAN_INTERVAL_MS: u64 = 5_000;
const MAX_EVENTS_PER_READ: usize = 64;
const AUDIO_JACK_SWITCHES: [u16; 4] = [
    SW_HEADPHONE_INSERT,
    SW_MICROPHONE_INSERT,
    SW_LINEOUT_INSERT,
    SW_VIDEOOUT_INSERT,
];

/// Ties every core component into one owner and runs the reactor.
pub struct App {
    input_dir: PathBuf,
    simulate: bool,
    started: Instant,

    registry: DeviceRegistry,
    scheduler: Scheduler,
    tklock: TklockSm,
    ts_grab: TsGrab,
    kp_grab: KpGrab,
    submode_pipe: Datapipe<Submode>,

    config: AppConfig,

    active_timers: HashMap<&'static str, TimerId>,
    fired_timers: Rc<RefCell<VecDeque<&'static str>>>,
    ts_grab_pending: Rc<Cell<Option<bool>>>,
    kp_grab_pending: Rc<Cell<Option<bool>>>,

    last_keyboard_available: Option<bool>,
    jack_switch_state: HashMap<u16, bool>,
    rescan_due_ms: u64,
}

impl App {
    pub fn new(config: AppConfig, input_dir: PathBuf, simulate: bool) -> Self {
        let fired_timers = Rc::new(RefCell::new(VecDeque::new()));
        let ts_grab_pending: Rc<Cell<Option<bool>>> = Rc::new(Cell::new(None));
        let kp_grab_pending: Rc<Cell<Option<bool>>> = Rc::new(Cell::new(None));

        let ts_grab_pending_cb = ts_grab_pending.clone();
        let mut ts_grab = TsGrab::new(move |have_grab| ts_grab_pending_cb.set(Some(have_grab)));
        if let Some(path) = &config.sysfs.palm_status {
            ts_grab.set_palm_status_path(path.clone());
        }

        let kp_grab_pending_cb = kp_grab_pending.clone();
        let kp_grab = KpGrab::new(move |have_grab| kp_grab_pending_cb.set(Some(have_grab)));

        Self {
            input_dir,
            simulate,
            started: Instant::now(),
            registry: DeviceRegistry::new(config.clone()),
            scheduler: Scheduler::new(),
            tklock: TklockSm::new(Settings::default()),
            ts_grab,
            kp_grab,
            submode_pipe: Datapipe::new("submode"),
            config,
            active_timers: HashMap::new(),
            fired_timers,
            ts_grab_pending,
            kp_grab_pending,
            last_keyboard_available: None,
            jack_switch_state: HashMap::new(),
            rescan_due_ms: 0,
        }
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn is_simulate(&self) -> bool {
        self.simulate
    }

    /// Startup bootstrap (spec.md §4.G): permission check, full directory
    /// enumeration, initial switch-state probe, then the reactor proper.
    /// Never returns under normal operation.
    pub fn run(&mut self) -> Result<()> {
        self.bootstrap()?;
        self.finish_boot();
        loop {
            self.iterate()?;
        }
    }

    fn bootstrap(&mut self) -> Result<()> {
        match permissions::check_input_permissions(&self.input_dir)? {
            PermissionStatus::Granted => {}
            PermissionStatus::Denied { missing } => {
                for reason in &missing {
                    warn!(reason, "input permission check failed");
                }
                bail!(
                    "insufficient permissions to run mce-inputd\n\n{}",
                    permissions::get_permission_help(&self.input_dir)
                );
            }
        }

        let outcome = self.registry.rescan(&self.input_dir);
        info!(
            added = outcome.added.len(),
            removed = outcome.removed.len(),
            "initial device enumeration complete"
        );

        let initial_switches = self.registry.probe_initial_switches();
        for (_path, state) in &initial_switches {
            self.apply_initial_switch(state.switch, state.closed);
        }
        let states: Vec<_> = initial_switches.iter().map(|(_, s)| *s).collect();
        if let Some(inserted) = registry::audio_jack_inserted(&states) {
            let actions = self.tklock.on_jack_sense(inserted);
            self.apply_tklock_actions(actions);
        }

        self.sync_keyboard_availability();
        self.rescan_due_ms = self.now_ms() + DEVICE_RESCAN_INTERVAL_MS;
        Ok(())
    }

    /// Feeds `on_system_state(User)` once startup is otherwise complete,
    /// matching `TklockSm::new`'s `BOOTUP` submode default.
    fn finish_boot(&mut self) {
        let actions = self.tklock.on_system_state(SystemState::User);
        self.apply_tklock_actions(actions);
    }

    fn apply_initial_switch(&mut self, switch: u16, closed: bool) {
        let cover = if closed { CoverState::Closed } else { CoverState::Open };
        let actions = match switch {
            SW_LID => self.tklock.on_lid(cover),
            SW_CAMERA_LENS_COVER => self.tklock.on_lens_cover(cover),
            SW_FRONT_PROXIMITY => self.tklock.on_proximity(cover),
            SW_KEYPAD_SLIDE => Vec::new(), // folded into keyboard availability below
            code if AUDIO_JACK_SWITCHES.contains(&code) => {
                self.jack_switch_state.insert(code, closed);
                Vec::new()
            }
            _ => Vec::new(),
        };
        self.apply_tklock_actions(actions);
    }

    /// One reactor pass: compute the poll timeout from the timer heap,
    /// block in `poll(2)`, dispatch every ready device, drain expired
    /// timers, then apply whatever grab-state changes the dispatch
    /// batch produced.
    fn iterate(&mut self) -> Result<()> {
        let paths = self.registry.paths();
        let mut pollfds = Vec::with_capacity(paths.len());
        for path in &paths {
            if let Some(device) = self.registry.device(path) {
                let borrowed: BorrowedFd = device.fd.as_fd();
                pollfds.push(PollFd::new(borrowed, PollFlags::POLLIN));
            }
        }

        let now = self.now_ms();
        let deadline = [self.scheduler.next_deadline_ms(), Some(self.rescan_due_ms)]
            .into_iter()
            .flatten()
            .min();
        let timeout = match deadline {
            Some(deadline) => {
                let wait_ms = deadline.saturating_sub(now).min(u16::MAX as u64) as u16;
                PollTimeout::from(wait_ms)
            }
            None => PollTimeout::NONE,
        };

        let ready = poll(&mut pollfds, timeout).unwrap_or_else(|e| {
            warn!(error = %e, "poll(2) failed, continuing");
            0
        });

        if ready > 0 {
            for (path, pollfd) in paths.iter().zip(pollfds.iter()) {
                let Some(revents) = pollfd.revents() else { continue };
                if revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL) {
                    warn!(?path, "device fd reported error/hangup, deregistering");
                    self.registry.remove_device(path);
                } else if revents.contains(PollFlags::POLLIN) {
                    self.dispatch_device(path);
                }
            }
        }

        let now = self.now_ms();
        self.scheduler.drain_expired(now);
        self.drain_fired_timers();
        self.apply_pending_grabs();

        if now >= self.rescan_due_ms {
            self.run_rescan();
            self.rescan_due_ms = now + DEVICE_RESCAN_INTERVAL_MS;
        }

        Ok(())
    }

    fn run_rescan(&mut self) {
        let outcome = self.registry.rescan(&self.input_dir);
        if !outcome.added.is_empty() || !outcome.removed.is_empty() {
            info!(added = ?outcome.added, removed = ?outcome.removed, "device directory rescan");
        }
        self.sync_keyboard_availability();
    }

    fn dispatch_device(&mut self, path: &Path) {
        let now = self.now_ms();
        let Some(device) = self.registry.device_mut(path) else { return };
        let role = device.role;
        let name = device.name.clone();

        let mut raw_events: Vec<InputEvent> = Vec::new();
        let mut touchscreen_signals: Vec<TouchscreenSignal> = Vec::new();
        let mut key_switch_signals: Vec<KeySwitchSignal> = Vec::new();
        let mut activity_count = 0usize;

        let result = device.monitor.poll_once(
            &device.fd,
            MAX_EVENTS_PER_READ,
            now,
            &mut |event| raw_events.push(*event),
            &mut |s| touchscreen_signals.push(s),
            &mut |s| key_switch_signals.push(s),
            &mut || activity_count += 1,
        );

        if let Err(e) = result {
            warn!(?path, error = %e, "device read failed, deregistering");
            self.registry.remove_device(path);
            return;
        }

        if role == DeviceRole::Touch {
            for event in &raw_events {
                if self.ts_grab.on_event(event) {
                    self.arm_ts_release_timer();
                }
            }
        }

        for signal in touchscreen_signals {
            self.handle_touchscreen_signal(signal);
        }
        for signal in key_switch_signals {
            self.handle_key_switch_signal(&name, signal);
        }
        if activity_count > 0 {
            debug!(?path, activity_count, "device activity");
        }
    }

    fn handle_touchscreen_signal(&mut self, signal: TouchscreenSignal) {
        if let TouchscreenSignal::Gesture(0x4) = signal {
            let actions = self.tklock.on_doubletap_gesture();
            self.apply_tklock_actions(actions);
        }
    }

    fn handle_key_switch_signal(&mut self, device_name: &str, signal: KeySwitchSignal) {
        match signal {
            KeySwitchSignal::LockKey => {
                let actions = self.tklock.on_wake_key_pressed();
                self.apply_tklock_actions(actions);
            }
            KeySwitchSignal::CameraKey(pressed) => {
                debug!(device_name, pressed, "camera key event, forwarded to external subsystems");
            }
            KeySwitchSignal::ScreenlockKey(pressed) => {
                debug!(device_name, pressed, "screenlock key event, forwarded to external subsystems");
            }
            KeySwitchSignal::SwitchChanged { code, closed } => {
                self.handle_switch_changed(device_name, code, closed);
            }
        }
    }

    fn handle_switch_changed(&mut self, device_name: &str, code: u16, closed: bool) {
        let cover = if closed { CoverState::Closed } else { CoverState::Open };
        match code {
            SW_LID => {
                let actions = self.tklock.on_lid(cover);
                self.apply_tklock_actions(actions);
            }
            SW_CAMERA_LENS_COVER => {
                let actions = self.tklock.on_lens_cover(cover);
                self.apply_tklock_actions(actions);
            }
            SW_FRONT_PROXIMITY => {
                let actions = self.tklock.on_proximity(cover);
                self.apply_tklock_actions(actions);
            }
            SW_KEYPAD_SLIDE => {
                self.registry.note_switch_state(device_name, code, closed);
                self.sync_keyboard_availability();
            }
            code if AUDIO_JACK_SWITCHES.contains(&code) => {
                self.jack_switch_state.insert(code, closed);
                let inserted = self.jack_switch_state.values().any(|&v| v);
                let actions = self.tklock.on_jack_sense(inserted);
                self.apply_tklock_actions(actions);
            }
            _ => {}
        }
    }

    /// Feeds the registry's pure `keyboard_available` computation into
    /// the policy engine as a keyboard-slide cover transition, only on
    /// actual change. Resolves spec.md §9's open question by treating
    /// availability as a pure function of slide state, never forced open
    /// after a manual unlock (see DESIGN.md).
    fn sync_keyboard_availability(&mut self) {
        let available = self.registry.keyboard_available();
        if self.last_keyboard_available == Some(available) {
            return;
        }
        self.last_keyboard_available = Some(available);
        let cover = if available { CoverState::Open } else { CoverState::Closed };
        let actions = self.tklock.on_keyboard_slide(cover);
        self.apply_tklock_actions(actions);
    }

    fn arm_ts_release_timer(&mut self) {
        let delay = self.ts_grab.sm.release_delay_ms();
        let fired = self.fired_timers.clone();
        let now = self.now_ms();
        self.scheduler.schedule(now, delay, move || {
            fired.borrow_mut().push_back("ts_release");
        });
    }

    fn arm_kp_release_timer(&mut self) {
        let delay = self.kp_grab.sm.release_delay_ms();
        let fired = self.fired_timers.clone();
        let now = self.now_ms();
        self.scheduler.schedule(now, delay, move || {
            fired.borrow_mut().push_back("kp_release");
        });
    }

    /// Drains timers the scheduler ran this pass, routing each back to
    /// the state machine that owns its name. Timer callbacks cannot
    /// capture `&mut self` (the scheduler's closures are `'static` and
    /// `App` is not `Rc`-shared), so they only ever push a name onto
    /// this queue; all the real work happens here, single-threaded and
    /// outside the scheduler's own call stack.
    fn drain_fired_timers(&mut self) {
        loop {
            let name = self.fired_timers.borrow_mut().pop_front();
            let Some(name) = name else { break };
            match name {
                "ts_release" => {
                    if self.ts_grab.sm.on_release_timer() {
                        self.arm_ts_release_timer();
                    }
                }
                "kp_release" => {
                    if self.kp_grab.sm.on_release_timer() {
                        self.arm_kp_release_timer();
                    }
                }
                tklock_timer => {
                    self.active_timers.remove(tklock_timer);
                    let actions = self.tklock.on_timer_fired(tklock_timer);
                    self.apply_tklock_actions(actions);
                }
            }
        }
    }

    fn apply_pending_grabs(&mut self) {
        if let Some(have_grab) = self.ts_grab_pending.take() {
            let fds: Vec<&std::fs::File> = self
                .registry
                .devices_with_role(DeviceRole::Touch)
                .into_iter()
                .map(|d| &d.fd)
                .collect();
            apply_grab_to_devices(&fds, have_grab);
            if have_grab {
                self.ts_grab.grab_acquired();
            }
            if let Some(path) = &self.config.sysfs.disable_ts {
                if let Err(e) = sysfs::set_hw_interrupts_disabled(path, have_grab) {
                    warn!(error = %e, "disable_ts write failed");
                }
            }
        }
        if self.ts_grab.led_pattern_should_activate() {
            self.ts_grab.activate_led_pattern();
        } else if !self.ts_grab.sm.have_grab() {
            self.ts_grab.deactivate_led_pattern();
        }

        if let Some(have_grab) = self.kp_grab_pending.take() {
            let fds: Vec<&std::fs::File> = self
                .registry
                .devices_with_role(DeviceRole::VolumeKey)
                .into_iter()
                .map(|d| &d.fd)
                .collect();
            apply_grab_to_devices(&fds, have_grab);
            if let Some(path) = &self.config.sysfs.disable_kp {
                if let Err(e) = sysfs::set_hw_interrupts_disabled(path, have_grab) {
                    warn!(error = %e, "disable_kp write failed");
                }
            }
            // The keypad grab domain owns the camera key's hardware
            // interrupt line on devices that gate it through
            // gpio_key_disable rather than EVIOCGRAB alone.
            if let Some(path) = &self.config.sysfs.gpio_key_disable {
                if let Err(e) = sysfs::set_key_disabled(path, KEY_CAMERA, have_grab) {
                    warn!(error = %e, "gpio_key_disable write failed");
                }
            }
        }
    }

    /// Executes every effect a `TklockSm` setter returned. Timer actions
    /// go through [`Self::schedule_named`]/[`Self::cancel_named`] so a
    /// repeated `ScheduleTimer` for the same name replaces rather than
    /// stacks the pending deadline.
    fn apply_tklock_actions(&mut self, actions: Vec<TklockAction>) {
        for action in actions {
            match action {
                TklockAction::SetSubmode(bits) => {
                    self.submode_pipe.publish(bits);
                }
                TklockAction::SetUiVariant(variant) => {
                    debug!(?variant, "tklock UI variant changed");
                }
                TklockAction::EmitTklockModeInd(locked) => {
                    debug!(locked, "tklock_mode_ind");
                }
                TklockAction::EmitAlarmFeedback => debug!("alarm flip-over feedback"),
                TklockAction::EmitCallFeedback => debug!("call flip-over feedback"),
                TklockAction::RequestTouchGrab(want) => self.ts_grab.sm.set_want_grab(want),
                TklockAction::RequestKeypadGrab(want) => self.kp_grab.sm.set_want_grab(want),
                TklockAction::RequestDisplayDim => debug!("requesting display dim"),
                TklockAction::RequestDisplayBlank => debug!("requesting display blank"),
                TklockAction::RequestDisplayUnblank => debug!("requesting display unblank"),
                TklockAction::ScheduleTimer { name, delay_ms } => self.schedule_named(name, delay_ms),
                TklockAction::CancelTimer { name } => self.cancel_named(name),
                TklockAction::SetDoubletapGesture(enable) => {
                    if let Some(path) = &self.config.sysfs.wait_for_gesture {
                        if let Err(e) = sysfs::set_doubletap_gesture(path, enable) {
                            warn!(error = %e, "wait_for_gesture write failed");
                        }
                    }
                }
                TklockAction::RecalibrateTouch => {
                    if let Some(path) = &self.config.sysfs.calibrate {
                        if let Err(e) = sysfs::recalibrate(path) {
                            warn!(error = %e, "calibrate write failed");
                        }
                    }
                }
            }
        }
    }

    fn schedule_named(&mut self, name: &'static str, delay_ms: u64) {
        self.cancel_named(name);
        let fired = self.fired_timers.clone();
        let now = self.now_ms();
        let id = self.scheduler.schedule(now, delay_ms, move || {
            fired.borrow_mut().push_back(name);
        });
        self.active_timers.insert(name, id);
    }

    fn cancel_named(&mut self, name: &'static str) {
        if let Some(id) = self.active_timers.remove(name) {
            self.scheduler.cancel(id);
        }
    }

    /// `--simulate`: enumerate and classify devices, log the outcome,
    /// and return without opening the grab/tklock machinery against
    /// them.
    pub fn simulate_enumeration(&mut self) -> Result<()> {
        let outcome = self.registry.rescan(&self.input_dir);
        for path in &outcome.added {
            if let Some(device) = self.registry.device(path) {
                info!(?path, name = %device.name, role = ?device.role, "classified device");
            }
        }
        info!(count = self.registry.len(), "simulation enumeration complete");
        Ok(())
    }
}
