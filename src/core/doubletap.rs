/// `DoubletapEmulator` (spec.md §4.E) — reinterprets raw touch/mouse
/// streams into a synthesized `(EV_MSC, MSC_GESTURE, 0x4)` event.
///
/// A four-slot ring buffer tracks successive touch "frames" (delimited
/// by `SYN_REPORT`). Each slot accumulates which signals contributed to
/// it in `click_bits`, packed as four nibbles so the peak per-signal
/// count can be recovered by OR-reducing the nibbles — we only need
/// "was this signal present at all", so a saturating nibble is enough.
use super::evdev::codes::{
    ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_PRESSURE, ABS_MT_TOUCH_MAJOR, ABS_MT_TRACKING_ID,
    BTN_MOUSE, BTN_TOUCH, EV_ABS, EV_KEY, EV_REL, EV_SYN, REL_X, REL_Y, SYN_MT_REPORT, SYN_REPORT,
};
use super::evdev::InputEvent;

const RING_LEN: usize = 4;
const DOUBLETAP_INTERVAL_MS: i64 = 500;
const DOUBLETAP_RADIUS_PX: i32 = 100;

const BIT_MOUSE: u8 = 0b0001;
const BIT_PRESSURE: u8 = 0b0010;
const BIT_MAJOR: u8 = 0b0100;
const BIT_TRACKING: u8 = 0b1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoubletapRingEntry {
    pub timestamp_ms: i64,
    pub x: i32,
    pub y: i32,
    pub click_bits: u8,
}

#[derive(Debug, Clone)]
pub struct DoubletapEmulator {
    ring: [DoubletapRingEntry; RING_LEN],
    cursor: usize,
    acc_x: i32,
    acc_y: i32,
    skip_syn: bool,
}

impl Default for DoubletapEmulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DoubletapEmulator {
    pub fn new() -> Self {
        Self {
            ring: [DoubletapRingEntry::default(); RING_LEN],
            cursor: 0,
            acc_x: 0,
            acc_y: 0,
            skip_syn: false,
        }
    }

    fn current_mut(&mut self) -> &mut DoubletapRingEntry {
        &mut self.ring[self.cursor]
    }

    fn advance(&mut self) {
        let prev = self.cursor;
        self.cursor = (self.cursor + 1) % RING_LEN;
        self.ring[self.cursor] = DoubletapRingEntry {
            x: self.ring[prev].x,
            y: self.ring[prev].y,
            ..Default::default()
        };
    }

    fn active_point_count(bits: u8) -> u8 {
        (bits | (bits >> 1) | (bits >> 2) | (bits >> 3)) & 0b1
    }

    /// Feeds one event, using `now_ms` as the event's wall-clock
    /// timestamp (callers derive this from `InputEvent.tv_sec/tv_usec`
    /// or an injected clock in tests). Returns `true` exactly when a
    /// doubletap pattern completes on this call.
    pub fn feed(&mut self, event: &InputEvent, now_ms: i64) -> bool {
        match (event.ev_type, event.code) {
            (t, c) if t == EV_REL && c == REL_X => {
                self.acc_x += event.value;
                self.current_mut().x = self.acc_x;
                false
            }
            (t, c) if t == EV_REL && c == REL_Y => {
                self.acc_y += event.value;
                self.current_mut().y = self.acc_y;
                false
            }
            (t, c) if t == EV_KEY && c == BTN_MOUSE && event.value == 1 => {
                let x = self.acc_x;
                let y = self.acc_y;
                let entry = self.current_mut();
                entry.click_bits |= BIT_MOUSE;
                entry.x = x;
                entry.y = y;
                self.skip_syn = false;
                false
            }
            (t, c) if t == EV_KEY && c == BTN_TOUCH && event.value == 0 => {
                self.skip_syn = false;
                false
            }
            (t, c) if t == EV_ABS && c == ABS_MT_POSITION_X => {
                self.current_mut().x = event.value;
                self.skip_syn = false;
                false
            }
            (t, c) if t == EV_ABS && c == ABS_MT_POSITION_Y => {
                self.current_mut().y = event.value;
                self.skip_syn = false;
                false
            }
            (t, c) if t == EV_ABS && c == ABS_MT_PRESSURE => {
                if event.value > 0 {
                    self.current_mut().click_bits |= BIT_PRESSURE;
                }
                self.skip_syn = false;
                false
            }
            (t, c) if t == EV_ABS && c == ABS_MT_TOUCH_MAJOR => {
                if event.value > 0 {
                    self.current_mut().click_bits |= BIT_MAJOR;
                }
                self.skip_syn = false;
                false
            }
            (t, c) if t == EV_ABS && c == ABS_MT_TRACKING_ID => {
                if event.value != -1 {
                    self.current_mut().click_bits |= BIT_TRACKING;
                }
                self.skip_syn = false;
                false
            }
            (t, c) if t == EV_SYN && c == SYN_MT_REPORT => {
                self.skip_syn = false;
                false
            }
            (t, c) if t == EV_SYN && c == SYN_REPORT => self.finalize(now_ms),
            _ => false,
        }
    }

    fn finalize(&mut self, now_ms: i64) -> bool {
        if self.skip_syn {
            return false;
        }
        let prev_idx = (self.cursor + RING_LEN - 1) % RING_LEN;
        let prev_bits = self.ring[prev_idx].click_bits;
        self.ring[self.cursor].timestamp_ms = now_ms;

        let count = Self::active_point_count(self.ring[self.cursor].click_bits);
        let prev_count = Self::active_point_count(prev_bits);
        if count == prev_count {
            return false;
        }

        // The slot count just changed: this is a genuine press/release
        // transition. Check the pattern anchored here, *before*
        // advancing past it for future events.
        let detected = self.detect_pattern(self.cursor);
        self.advance();
        detected
    }

    /// Checks the four slots ending at `idx` (the slot just finalized)
    /// for a press/release/press/release sequence within the timing and
    /// spatial thresholds. On a match, clears all history (spec.md §4.E:
    /// "reset all history").
    fn detect_pattern(&mut self, idx: usize) -> bool {
        let release_now = &self.ring[idx];
        let press_prev = &self.ring[(idx + RING_LEN - 1) % RING_LEN];
        let release_earlier = &self.ring[(idx + RING_LEN - 2) % RING_LEN];
        let press_earliest = &self.ring[(idx + RING_LEN - 3) % RING_LEN];

        let release_now_down = Self::active_point_count(release_now.click_bits) == 0;
        let press_prev_down = Self::active_point_count(press_prev.click_bits) != 0;
        let release_earlier_down = Self::active_point_count(release_earlier.click_bits) == 0;
        let press_earliest_down = Self::active_point_count(press_earliest.click_bits) != 0;

        if !(release_now_down && press_prev_down && release_earlier_down && press_earliest_down) {
            return false;
        }

        let interval_ok =
            (release_now.timestamp_ms - press_prev.timestamp_ms).abs() <= DOUBLETAP_INTERVAL_MS;
        let dx = (press_prev.x - press_earliest.x) as i64;
        let dy = (press_prev.y - press_earliest.y) as i64;
        let dist_sq = dx * dx + dy * dy;
        let spatial_ok = dist_sq <= (DOUBLETAP_RADIUS_PX as i64) * (DOUBLETAP_RADIUS_PX as i64);

        if interval_ok && spatial_ok {
            *self = Self::new();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evdev::codes::KEY_POWER;

    fn mt_press(x: i32, y: i32) -> Vec<InputEvent> {
        vec![
            InputEvent::new(EV_ABS, ABS_MT_POSITION_X, x),
            InputEvent::new(EV_ABS, ABS_MT_POSITION_Y, y),
            InputEvent::new(EV_ABS, ABS_MT_PRESSURE, 1),
            InputEvent::new(EV_SYN, SYN_REPORT, 0),
        ]
    }

    fn mt_release() -> Vec<InputEvent> {
        vec![
            InputEvent::new(EV_ABS, ABS_MT_PRESSURE, 0),
            InputEvent::new(EV_SYN, SYN_REPORT, 0),
        ]
    }

    #[test]
    fn detects_scenario_2_pattern() {
        let mut emu = DoubletapEmulator::new();
        let mut result = false;
        for ev in mt_press(100, 100) {
            result |= emu.feed(&ev, 0);
        }
        for ev in mt_release() {
            result |= emu.feed(&ev, 80);
        }
        for ev in mt_press(103, 103) {
            result |= emu.feed(&ev, 200);
        }
        for ev in mt_release() {
            result |= emu.feed(&ev, 260);
        }
        assert!(result, "expected doubletap to be detected");

        // A third press alone (no matching release sequence yet) must
        // not produce another gesture.
        let mut third = false;
        for ev in mt_press(100, 100) {
            third |= emu.feed(&ev, 300);
        }
        assert!(!third);
    }

    #[test]
    fn no_gesture_without_second_press_release() {
        let mut emu = DoubletapEmulator::new();
        let mut result = false;
        for ev in mt_press(100, 100) {
            result |= emu.feed(&ev, 0);
        }
        for ev in mt_release() {
            result |= emu.feed(&ev, 80);
        }
        assert!(!result);
    }

    #[test]
    fn too_far_apart_spatially_suppresses_detection() {
        let mut emu = DoubletapEmulator::new();
        let mut result = false;
        for ev in mt_press(0, 0) {
            result |= emu.feed(&ev, 0);
        }
        for ev in mt_release() {
            result |= emu.feed(&ev, 80);
        }
        for ev in mt_press(500, 500) {
            result |= emu.feed(&ev, 200);
        }
        for ev in mt_release() {
            result |= emu.feed(&ev, 260);
        }
        assert!(!result);
    }

    #[test]
    fn key_power_event_is_unrelated_to_ring_accumulation() {
        let mut emu = DoubletapEmulator::new();
        let ev = InputEvent::new(EV_KEY, KEY_POWER, 0);
        assert!(!emu.feed(&ev, 0));
    }
}
