/// `IoMonitor` (spec.md §4.F) — per-device-fd reader and role-specific
/// event handler. Reads are `sizeof(InputEvent)`-chunked; a short read is
/// a protocol error the caller (the registry) must treat as "close and
/// deregister this device" per §7.
use std::fs::File;

use tracing::warn;

use super::doubletap::DoubletapEmulator;
use super::evdev::classifier::DeviceRole;
use super::evdev::codes::{
    ABS_PRESSURE, BTN_TOUCH, EV_ABS, EV_KEY, EV_LED_UNSUPPORTED, EV_MSC, EV_SW, EV_SYN,
    KEY_CAMERA, KEY_CAMERA_FOCUS, KEY_POWER, KEY_SCREENLOCK, MSC_GESTURE, SW_CAMERA_LENS_COVER,
    SW_KEYPAD_SLIDE,
};
use super::evdev::{raw, EventMapper, InputEvent};

/// Activity pings are rate-limited separately for the "raw" stream (any
/// device) and the "cooked" stream (touch-specific); this only models
/// the single rate limiter each handler actually uses.
const ACTIVITY_RATE_LIMIT_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchscreenSignal {
    BtnTouch(bool),
    AbsPressure(i32),
    Gesture(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySwitchSignal {
    LockKey,
    CameraKey(bool),
    ScreenlockKey(bool),
    SwitchChanged { code: u16, closed: bool },
}

pub struct IoMonitor {
    role: DeviceRole,
    mapper: EventMapper,
    doubletap: DoubletapEmulator,
    last_activity_ms: Option<u64>,
    /// Set by the owning grab/display context before each dispatch batch;
    /// this module never reaches into TklockSM directly.
    pub grab_active: bool,
    pub fake_doubletap_enabled: bool,
    pub display_off_or_lpm: bool,
    pub event_eater_active: bool,
    pub keypad_grab_active: bool,
}

impl IoMonitor {
    pub fn new(role: DeviceRole, mapper: EventMapper) -> Self {
        Self {
            role,
            mapper,
            doubletap: DoubletapEmulator::new(),
            last_activity_ms: None,
            grab_active: false,
            fake_doubletap_enabled: false,
            display_off_or_lpm: false,
            event_eater_active: false,
            keypad_grab_active: false,
        }
    }

    /// Reads up to `max_events` records from `fd` and dispatches each to
    /// the role-specific handler, applying `EventMapper::apply` first.
    /// `raw_out` sees every mapped event ahead of role dispatch — the
    /// touchscreen grab domain's coherent-frame tracker needs the same
    /// `ABS_MT_*`/`SYN_REPORT` stream this handler consumes internally
    /// for gesture/activity detection, so it taps in here rather than
    /// duplicating a second read of the device.
    pub fn poll_once(
        &mut self,
        fd: &File,
        max_events: usize,
        now_ms: u64,
        raw_out: &mut impl FnMut(&InputEvent),
        touchscreen_out: &mut impl FnMut(TouchscreenSignal),
        key_switch_out: &mut impl FnMut(KeySwitchSignal),
        activity_out: &mut impl FnMut(),
    ) -> anyhow::Result<()> {
        let mut events = raw::read_events(fd, max_events)?;
        for event in &mut events {
            self.mapper.apply(event);
            raw_out(event);
            self.dispatch(event, now_ms, touchscreen_out, key_switch_out, activity_out);
        }
        Ok(())
    }

    fn dispatch(
        &mut self,
        event: &InputEvent,
        now_ms: u64,
        touchscreen_out: &mut impl FnMut(TouchscreenSignal),
        key_switch_out: &mut impl FnMut(KeySwitchSignal),
        activity_out: &mut impl FnMut(),
    ) {
        match self.role {
            DeviceRole::Touch => self.handle_touchscreen(event, now_ms, touchscreen_out, activity_out),
            DeviceRole::Doubletap => self.handle_doubletap_key(event, now_ms, touchscreen_out, activity_out),
            DeviceRole::Input | DeviceRole::VolumeKey | DeviceRole::Keyboard => {
                self.handle_key_switch(event, now_ms, key_switch_out, activity_out)
            }
            DeviceRole::Activity => self.handle_activity(event, now_ms, activity_out),
            _ => {}
        }
    }

    fn maybe_emit_activity(&mut self, now_ms: u64, activity_out: &mut impl FnMut()) {
        let should_emit = match self.last_activity_ms {
            Some(last) => now_ms.saturating_sub(last) >= ACTIVITY_RATE_LIMIT_MS,
            None => true,
        };
        if should_emit {
            self.last_activity_ms = Some(now_ms);
            activity_out();
        }
    }

    fn handle_touchscreen(
        &mut self,
        event: &InputEvent,
        now_ms: u64,
        touchscreen_out: &mut impl FnMut(TouchscreenSignal),
        activity_out: &mut impl FnMut(),
    ) {
        // Legacy devices report doubletap as a power-key release on the
        // touch node itself.
        if event.ev_type == EV_KEY && event.code == KEY_POWER && event.value == 0 {
            touchscreen_out(TouchscreenSignal::Gesture(0x4));
            self.maybe_emit_activity(now_ms, activity_out);
            return;
        }

        let feed_doubletap = self.grab_active || (self.fake_doubletap_enabled && self.display_off_or_lpm);
        if feed_doubletap && self.doubletap.feed(event, now_ms as i64) {
            touchscreen_out(TouchscreenSignal::Gesture(0x4));
            self.maybe_emit_activity(now_ms, activity_out);
            return;
        }

        self.maybe_emit_activity(now_ms, activity_out);

        if self.event_eater_active {
            return;
        }
        match (event.ev_type, event.code) {
            (t, c) if t == EV_KEY && c == BTN_TOUCH => {
                touchscreen_out(TouchscreenSignal::BtnTouch(event.value != 0));
            }
            (t, c) if t == EV_ABS && c == ABS_PRESSURE => {
                touchscreen_out(TouchscreenSignal::AbsPressure(event.value));
            }
            (t, c) if t == EV_MSC && c == MSC_GESTURE => {
                touchscreen_out(TouchscreenSignal::Gesture(event.value as u8));
            }
            _ => {}
        }
    }

    fn handle_doubletap_key(
        &mut self,
        event: &InputEvent,
        now_ms: u64,
        touchscreen_out: &mut impl FnMut(TouchscreenSignal),
        activity_out: &mut impl FnMut(),
    ) {
        if event.ev_type == EV_KEY && event.code == KEY_POWER {
            self.handle_touchscreen(event, now_ms, touchscreen_out, activity_out);
        }
    }

    fn handle_key_switch(
        &mut self,
        event: &InputEvent,
        now_ms: u64,
        key_switch_out: &mut impl FnMut(KeySwitchSignal),
        activity_out: &mut impl FnMut(),
    ) {
        if event.ev_type == EV_KEY {
            if self.keypad_grab_active && is_volume_key(event.code) {
                return; // ignored while the keypad grab domain owns input
            }
            let is_press = event.value != 0;
            match event.code {
                c if c == KEY_CAMERA || c == KEY_CAMERA_FOCUS => {
                    key_switch_out(KeySwitchSignal::CameraKey(is_press))
                }
                c if c == KEY_SCREENLOCK => key_switch_out(KeySwitchSignal::ScreenlockKey(is_press)),
                c if c == KEY_POWER => key_switch_out(KeySwitchSignal::LockKey),
                _ => {}
            }
            // Presses always generate activity; this handler never
            // suppresses it the way closing switches do below.
            self.maybe_emit_activity(now_ms, activity_out);
            return;
        }

        if event.ev_type == EV_SW {
            let closed = event.value != 0;
            key_switch_out(KeySwitchSignal::SwitchChanged { code: event.code, closed });
            // "Closing" transitions for lens cover / keyboard slide are
            // not activity (spec.md §4.F).
            let suppress_activity = closed && (event.code == SW_CAMERA_LENS_COVER || event.code == SW_KEYPAD_SLIDE);
            if !suppress_activity {
                self.maybe_emit_activity(now_ms, activity_out);
            }
        }
    }

    fn handle_activity(&mut self, event: &InputEvent, now_ms: u64, activity_out: &mut impl FnMut()) {
        // SYN/LED/force-feedback events never count as activity.
        if event.ev_type == EV_SYN || event.ev_type == EV_LED_UNSUPPORTED {
            return;
        }
        self.maybe_emit_activity(now_ms, activity_out);
    }
}

fn is_volume_key(code: u16) -> bool {
    code == super::evdev::codes::KEY_VOLUMEUP || code == super::evdev::codes::KEY_VOLUMEDOWN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evdev::codes::{EV_KEY, KEY_Q, SW_LID};

    #[test]
    fn touchscreen_handler_forwards_btn_touch_and_pressure() {
        let mut monitor = IoMonitor::new(DeviceRole::Touch, EventMapper::new());
        let mut signals = Vec::new();
        let mut activity = 0;
        monitor.dispatch(
            &InputEvent::new(EV_KEY, BTN_TOUCH, 1),
            0,
            &mut |s| signals.push(s),
            &mut |_| {},
            &mut || activity += 1,
        );
        monitor.dispatch(
            &InputEvent::new(EV_ABS, ABS_PRESSURE, 42),
            2_000,
            &mut |s| signals.push(s),
            &mut |_| {},
            &mut || activity += 1,
        );
        assert_eq!(signals, vec![TouchscreenSignal::BtnTouch(true), TouchscreenSignal::AbsPressure(42)]);
        assert_eq!(activity, 2);
    }

    #[test]
    fn legacy_power_key_release_on_touch_device_becomes_gesture() {
        let mut monitor = IoMonitor::new(DeviceRole::Touch, EventMapper::new());
        let mut signals = Vec::new();
        monitor.dispatch(
            &InputEvent::new(EV_KEY, KEY_POWER, 0),
            0,
            &mut |s| signals.push(s),
            &mut |_| {},
            &mut || {},
        );
        assert_eq!(signals, vec![TouchscreenSignal::Gesture(0x4)]);
    }

    #[test]
    fn event_eater_suppresses_touch_publish_but_not_activity() {
        let mut monitor = IoMonitor::new(DeviceRole::Touch, EventMapper::new());
        monitor.event_eater_active = true;
        let mut signals = Vec::new();
        let mut activity = 0;
        monitor.dispatch(
            &InputEvent::new(EV_KEY, BTN_TOUCH, 1),
            0,
            &mut |s| signals.push(s),
            &mut |_| {},
            &mut || activity += 1,
        );
        assert!(signals.is_empty());
        assert_eq!(activity, 1);
    }

    #[test]
    fn keypad_grab_ignores_volume_keys() {
        let mut monitor = IoMonitor::new(DeviceRole::VolumeKey, EventMapper::new());
        monitor.keypad_grab_active = true;
        let mut signals = Vec::new();
        monitor.dispatch(
            &InputEvent::new(EV_KEY, super::super::evdev::codes::KEY_VOLUMEUP, 1),
            0,
            &mut |_| {},
            &mut |s| signals.push(s),
            &mut || {},
        );
        assert!(signals.is_empty());
    }

    #[test]
    fn lens_cover_closing_does_not_generate_activity() {
        let mut monitor = IoMonitor::new(DeviceRole::Input, EventMapper::new());
        let mut signals = Vec::new();
        let mut activity = 0;
        monitor.dispatch(
            &InputEvent::new(EV_SW, SW_CAMERA_LENS_COVER, 1),
            0,
            &mut |_| {},
            &mut |s| signals.push(s),
            &mut || activity += 1,
        );
        assert_eq!(
            signals,
            vec![KeySwitchSignal::SwitchChanged { code: SW_CAMERA_LENS_COVER, closed: true }]
        );
        assert_eq!(activity, 0);
    }

    #[test]
    fn lid_switch_opening_does_generate_activity() {
        let mut monitor = IoMonitor::new(DeviceRole::Input, EventMapper::new());
        let mut activity = 0;
        monitor.dispatch(
            &InputEvent::new(EV_SW, SW_LID, 0),
            0,
            &mut |_| {},
            &mut |_| {},
            &mut || activity += 1,
        );
        assert_eq!(activity, 1);
    }

    #[test]
    fn keyboard_role_key_press_still_reaches_key_switch_handler() {
        let mut monitor = IoMonitor::new(DeviceRole::Keyboard, EventMapper::new());
        let mut activity = 0;
        monitor.dispatch(
            &InputEvent::new(EV_KEY, KEY_Q, 1),
            0,
            &mut |_| {},
            &mut |_| {},
            &mut || activity += 1,
        );
        assert_eq!(activity, 1);
    }

    #[test]
    fn key_switch_activity_is_rate_limited_per_second_by_real_clock() {
        let mut monitor = IoMonitor::new(DeviceRole::Input, EventMapper::new());
        let mut activity = 0;
        let mut tick = |now_ms: u64| {
            monitor.dispatch(
                &InputEvent::new(EV_KEY, KEY_CAMERA, 1),
                now_ms,
                &mut |_| {},
                &mut |_| {},
                &mut || activity += 1,
            );
        };
        tick(0);
        tick(500); // within the 1s window, suppressed
        assert_eq!(activity, 1);
        tick(1_001); // a full second later, allowed again
        assert_eq!(activity, 2);
    }
}
