/// `EvdevBits` — a capability bitmap for one `(device, event-type)` pair
/// (spec.md §4.A / §3).
///
/// Populated by `EVIOCGBIT(type, cnt)`. Storage is byte-granular (the
/// "machine word" of §3 is a `u8` here): `bits.len() == ceil(cnt / 8)`.
/// `test(i)` is bounds-checked and returns `false` for any `i >= cnt`,
/// including indices that technically exist in the backing byte array
/// because `cnt` is not a multiple of 8.
use std::fs::File;

use anyhow::Result;

use super::codes::{cnt_for_type, EV_CNT};
use super::raw;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvdevBits {
    ev_type: u16,
    cnt: usize,
    bits: Vec<u8>,
}

impl EvdevBits {
    /// Allocates a zero-filled bitmap for `ev_type`, or `None` if this
    /// event type is outside {SYN, KEY, REL, ABS, MSC, SW} — the set the
    /// policy tracks per spec.md §4.A.
    pub fn new(ev_type: u16) -> Option<Self> {
        let cnt = cnt_for_type(ev_type)?;
        Some(Self {
            ev_type,
            cnt,
            bits: vec![0u8; cnt.div_ceil(8)],
        })
    }

    /// Allocates a zero-filled bitmap sized for `EVIOCGBIT(0, EV_CNT)`:
    /// the "which event types does this device have" probe (spec.md
    /// §4.B), which is wider than `EV_SYN`'s own per-type code count and
    /// must never be confused with it.
    pub fn new_type_bitmap() -> Self {
        Self {
            ev_type: 0,
            cnt: EV_CNT,
            bits: vec![0u8; EV_CNT.div_ceil(8)],
        }
    }

    pub fn ev_type(&self) -> u16 {
        self.ev_type
    }

    pub fn cnt(&self) -> usize {
        self.cnt
    }

    /// Issues `EVIOCGBIT(type, cnt)`. On failure, per §7 ("capability
    /// probe failed: ... treat device as Reject, continue"), the bitmap
    /// is cleared to all-zero and the error is returned for the caller
    /// to log.
    pub fn probe(&mut self, fd: &File) -> Result<()> {
        match raw::ioctl_gbit(fd, self.ev_type, &mut self.bits) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|b| *b = 0);
    }

    /// `true` iff bit `i` is set. Always `false` for `i >= cnt`, even if
    /// the byte array has slack bits past `cnt` (the kernel leaves those
    /// unspecified; we never trust them).
    pub fn test(&self, i: u16) -> bool {
        let i = i as usize;
        if i >= self.cnt {
            return false;
        }
        let byte = self.bits[i / 8];
        (byte >> (i % 8)) & 1 != 0
    }

    /// Sets a bit directly — used only by tests to build fixture bitmaps
    /// without going through a real ioctl.
    #[cfg(test)]
    pub fn set_for_test(&mut self, i: u16) {
        let i = i as usize;
        assert!(i < self.cnt);
        self.bits[i / 8] |= 1 << (i % 8);
    }

    /// Exposes the backing byte buffer for ioctls whose result is
    /// shaped like a bitmap but isn't `EVIOCGBIT` itself (`EVIOCGKEY`,
    /// `EVIOCGSW`).
    pub(super) fn raw_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evdev::codes::{EV_KEY, EV_LED_UNSUPPORTED};

    #[test]
    fn unsupported_event_type_yields_none() {
        assert!(EvdevBits::new(EV_LED_UNSUPPORTED).is_none());
    }

    #[test]
    fn type_bitmap_is_sized_to_ev_cnt_not_ev_syn() {
        // EV_SYN's own code count is 1; the type bitmap must be wide
        // enough to test every event type up to EV_CNT, including
        // EV_KEY (1), EV_ABS (3), EV_SW (5).
        let bits = EvdevBits::new_type_bitmap();
        assert_eq!(bits.cnt(), EV_CNT);
        assert!(!bits.test(EV_KEY));
    }

    #[test]
    fn fresh_bitmap_is_all_false() {
        let bits = EvdevBits::new(EV_KEY).unwrap();
        assert!(!bits.test(0));
        assert!(!bits.test(767));
    }

    #[test]
    fn test_is_bounds_checked_past_cnt() {
        let bits = EvdevBits::new(EV_KEY).unwrap();
        // KEY_CNT is 768; querying far past that must be false, not panic.
        assert!(!bits.test(65000));
    }

    #[test]
    fn set_and_test_round_trip() {
        let mut bits = EvdevBits::new(EV_KEY).unwrap();
        bits.set_for_test(115); // KEY_VOLUMEUP
        assert!(bits.test(115));
        assert!(!bits.test(114));
    }

    #[test]
    fn clear_resets_all_bits() {
        let mut bits = EvdevBits::new(EV_KEY).unwrap();
        bits.set_for_test(1);
        bits.clear();
        assert!(!bits.test(1));
    }
}
