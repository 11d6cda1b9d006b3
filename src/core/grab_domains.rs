/// `TsGrab`/`KpGrab` (spec.md §4.I) — the two concrete instantiations of
/// [`InputGrabSM`] for the touchscreen and volume-key domains.
use std::cell::RefCell;
use std::fs::File;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::warn;

use super::evdev::codes::{
    ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_PRESSURE, ABS_MT_TOUCH_MAJOR, BTN_TOUCH, EV_ABS,
    EV_KEY, EV_SYN, KEY_VOLUMEDOWN, KEY_VOLUMEUP, SYN_REPORT,
};
use super::evdev::{raw, InputEvent};
use super::grab::{InputGrabState, ReleaseVerify};
use super::sysfs;

pub const TS_RELEASE_DELAY_DEFAULT_MS: u64 = 100;
pub const TS_RELEASE_DELAY_FAKE_TOUCH_MS: u64 = 600;
pub const KP_RELEASE_DELAY_MS: u64 = 200;
pub const LED_PATTERN_DELAY_MS: u64 = 200;

/// Coherent-touch-frame tracker: a touch is "present" within one
/// `SYN_REPORT` window iff X, Y and a positive pressure/major were all
/// seen; `BTN_TOUCH=0` forces the frame to finalize as not-present.
#[derive(Debug, Clone, Copy, Default)]
struct TouchFrame {
    saw_x: bool,
    saw_y: bool,
    saw_contact_size: bool,
    forced_absent: bool,
}

impl TouchFrame {
    fn is_present(&self) -> bool {
        !self.forced_absent && self.saw_x && self.saw_y && self.saw_contact_size
    }
}

pub struct TsGrab {
    pub sm: InputGrabState,
    frame: TouchFrame,
    palm_status_path: Rc<RefCell<Option<PathBuf>>>,
    led_pattern_active: bool,
}

impl TsGrab {
    pub fn new(grab_changed: impl FnMut(bool) + 'static) -> Self {
        let palm_status_path: Rc<RefCell<Option<PathBuf>>> = Rc::new(RefCell::new(None));
        let verify_path = palm_status_path.clone();
        let sm = InputGrabState::new(
            "touchscreen",
            TS_RELEASE_DELAY_DEFAULT_MS,
            grab_changed,
            move || read_palm_status_for_verify(&verify_path),
        );
        Self {
            sm,
            frame: TouchFrame::default(),
            palm_status_path,
            led_pattern_active: false,
        }
    }

    pub fn set_palm_status_path(&mut self, path: PathBuf) {
        *self.palm_status_path.borrow_mut() = Some(path);
    }

    /// Consults the palm-detect sysfs node if configured; non-zero keeps
    /// the grab held (spec.md §4.I "release_verify_cb reads
    /// .../palm_status; non-zero keeps grab held"). This is the same
    /// check [`InputGrabState::on_release_timer`] runs internally; it is
    /// exposed separately for callers that want the current reading
    /// without driving a release timer tick.
    pub fn release_verify(&self) -> ReleaseVerify {
        read_palm_status_for_verify(&self.palm_status_path)
    }

    /// Feeds one event from a touch-role device; updates the coherent
    /// frame and, on `SYN_REPORT`, reports the finalized presence to the
    /// grab state machine. Returns `true` if the release timer should be
    /// (re)armed.
    pub fn on_event(&mut self, event: &InputEvent) -> bool {
        match (event.ev_type, event.code) {
            (t, c) if t == EV_ABS && c == ABS_MT_POSITION_X => {
                self.frame.saw_x = true;
                false
            }
            (t, c) if t == EV_ABS && c == ABS_MT_POSITION_Y => {
                self.frame.saw_y = true;
                false
            }
            (t, c) if t == EV_ABS && (c == ABS_MT_PRESSURE || c == ABS_MT_TOUCH_MAJOR) => {
                if event.value > 0 {
                    self.frame.saw_contact_size = true;
                }
                false
            }
            (t, c) if t == EV_KEY && c == BTN_TOUCH && event.value == 0 => {
                self.frame.forced_absent = true;
                false
            }
            (t, c) if t == EV_SYN && c == SYN_REPORT => {
                let present = self.frame.is_present();
                self.frame = TouchFrame::default();
                self.sm.set_touching(present)
            }
            _ => false,
        }
    }

    pub fn grab_acquired(&mut self) {
        self.led_pattern_active = false;
    }

    pub fn led_pattern_should_activate(&self) -> bool {
        self.sm.have_grab() && !self.led_pattern_active
    }

    pub fn activate_led_pattern(&mut self) {
        self.led_pattern_active = true;
    }

    pub fn deactivate_led_pattern(&mut self) {
        self.led_pattern_active = false;
    }
}

fn read_palm_status_for_verify(path: &Rc<RefCell<Option<PathBuf>>>) -> ReleaseVerify {
    match path.borrow().as_ref() {
        Some(path) => match sysfs::read_palm_status(path) {
            Ok(true) => ReleaseVerify::StillHolding,
            Ok(false) => ReleaseVerify::Released,
            Err(e) => {
                warn!(error = %e, "palm_status read failed, treating as released");
                ReleaseVerify::Released
            }
        },
        None => ReleaseVerify::Released,
    }
}

pub struct KpGrab {
    pub sm: InputGrabState,
    volume_up_pressed: bool,
    volume_down_pressed: bool,
}

impl KpGrab {
    pub fn new(grab_changed: impl FnMut(bool) + 'static) -> Self {
        let sm = InputGrabState::new(
            "volume-key",
            KP_RELEASE_DELAY_MS,
            grab_changed,
            || ReleaseVerify::Released,
        );
        Self {
            sm,
            volume_up_pressed: false,
            volume_down_pressed: false,
        }
    }

    /// `touching` is the OR of volume-up/-down pressed state.
    pub fn on_event(&mut self, event: &InputEvent) -> bool {
        if event.ev_type != EV_KEY {
            return false;
        }
        match event.code {
            c if c == KEY_VOLUMEUP => self.volume_up_pressed = event.value != 0,
            c if c == KEY_VOLUMEDOWN => self.volume_down_pressed = event.value != 0,
            _ => return false,
        }
        self.sm.set_touching(self.volume_up_pressed || self.volume_down_pressed)
    }
}

/// Issues `EVIOCGRAB` on every device in `domain` after the grab state
/// machine settles. Errors are logged but not propagated, matching
/// §7's "open/read/ioctl failed mid-stream: log, close, deregister" —
/// the registry, not the grab machinery, owns device teardown.
pub fn apply_grab_to_devices(devices: &[&File], grab: bool) {
    for fd in devices {
        if let Err(e) = raw::ioctl_grab(fd, grab) {
            warn!(error = %e, grab, "EVIOCGRAB failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coherent_touch_frame_requires_position_and_contact_size() {
        let mut ts = TsGrab::new(|_| {});
        ts.on_event(&InputEvent::new(EV_ABS, ABS_MT_POSITION_X, 10));
        ts.on_event(&InputEvent::new(EV_ABS, ABS_MT_POSITION_Y, 10));
        ts.on_event(&InputEvent::new(EV_ABS, ABS_MT_PRESSURE, 1));
        ts.on_event(&InputEvent::new(EV_SYN, SYN_REPORT, 0));
        ts.sm.set_want_grab(true);
        assert!(!ts.sm.have_grab(), "still touching, must defer");
    }

    #[test]
    fn btn_touch_zero_forces_frame_absent() {
        let mut ts = TsGrab::new(|_| {});
        ts.on_event(&InputEvent::new(EV_ABS, ABS_MT_POSITION_X, 10));
        ts.on_event(&InputEvent::new(EV_ABS, ABS_MT_POSITION_Y, 10));
        ts.on_event(&InputEvent::new(EV_ABS, ABS_MT_PRESSURE, 1));
        ts.on_event(&InputEvent::new(EV_KEY, BTN_TOUCH, 0));
        ts.on_event(&InputEvent::new(EV_SYN, SYN_REPORT, 0));
        ts.sm.set_want_grab(true);
        ts.sm.on_release_timer();
        assert!(ts.sm.have_grab());
    }

    #[test]
    fn palm_status_sysfs_node_keeps_release_timer_from_dropping_the_grab() {
        let dir = tempfile::TempDir::new().unwrap();
        let palm_path = dir.path().join("palm_status");
        std::fs::write(&palm_path, "0\n").unwrap();

        let mut ts = TsGrab::new(|_| {});
        ts.set_palm_status_path(palm_path.clone());
        ts.on_event(&InputEvent::new(EV_ABS, ABS_MT_POSITION_X, 10));
        ts.on_event(&InputEvent::new(EV_ABS, ABS_MT_POSITION_Y, 10));
        ts.on_event(&InputEvent::new(EV_ABS, ABS_MT_PRESSURE, 1));
        ts.on_event(&InputEvent::new(EV_SYN, SYN_REPORT, 0));
        ts.sm.set_want_grab(true);
        ts.on_event(&InputEvent::new(EV_KEY, BTN_TOUCH, 0));
        ts.on_event(&InputEvent::new(EV_SYN, SYN_REPORT, 0));

        std::fs::write(&palm_path, "1\n").unwrap();
        assert!(ts.sm.on_release_timer(), "palm still resting, must re-arm");
        assert!(ts.sm.have_grab());

        std::fs::write(&palm_path, "0\n").unwrap();
        assert!(!ts.sm.on_release_timer());
        assert!(!ts.sm.have_grab());
    }

    #[test]
    fn scenario_3_volume_key_grab_lifecycle() {
        let mut kp = KpGrab::new(|_| {});
        kp.on_event(&InputEvent::new(EV_KEY, KEY_VOLUMEUP, 1));
        kp.sm.set_want_grab(true);
        assert!(!kp.sm.have_grab(), "must not grab while key is held");
        kp.on_event(&InputEvent::new(EV_KEY, KEY_VOLUMEUP, 0));
        assert!(!kp.sm.have_grab(), "grab waits for the release timer");
        kp.sm.on_release_timer();
        assert!(kp.sm.have_grab());
    }
}
