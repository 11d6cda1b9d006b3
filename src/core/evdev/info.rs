/// `EvdevInfo` — the full capability record for one device (spec.md
/// §4.B): one optional `EvdevBits` slot per event type (0..`EV_CNT`).
use std::fs::File;

use super::bits::EvdevBits;
use super::codes::{EV_CNT, EV_KEY};
use super::raw;

#[derive(Debug, Clone, Default)]
pub struct EvdevInfo {
    slots: Vec<Option<EvdevBits>>,
}

impl EvdevInfo {
    pub fn new() -> Self {
        Self {
            slots: (0..EV_CNT).map(|_| None).collect(),
        }
    }

    /// Probes `fd`: first the type bitmap (`EV_SYN`, type 0, doubles as
    /// the "which types does this device have" bitmap), then the code
    /// bitmap for every type whose bit is set. Types the device does not
    /// advertise are left `None`.
    pub fn probe(&mut self, fd: &File) -> anyhow::Result<()> {
        let mut type_bits = EvdevBits::new_type_bitmap();
        if let Err(e) = type_bits.probe(fd) {
            tracing::warn!(error = %e, "EVIOCGBIT(0, EV_CNT) failed, treating device as capability-less");
            self.slots.iter_mut().for_each(|s| *s = None);
            return Err(e);
        }

        for ev_type in 0..EV_CNT as u16 {
            if !type_bits.test(ev_type) {
                self.slots[ev_type as usize] = None;
                continue;
            }
            match EvdevBits::new(ev_type) {
                Some(mut bits) => {
                    if let Err(e) = bits.probe(fd) {
                        tracing::warn!(ev_type, error = %e, "EVIOCGBIT failed for type, clearing");
                    }
                    self.slots[ev_type as usize] = Some(bits);
                }
                None => self.slots[ev_type as usize] = None,
            }
        }
        Ok(())
    }

    pub fn has_type(&self, ev_type: u16) -> bool {
        (ev_type as usize) < self.slots.len() && self.slots[ev_type as usize].is_some()
    }

    pub fn has_code(&self, ev_type: u16, code: u16) -> bool {
        self.slots
            .get(ev_type as usize)
            .and_then(|s| s.as_ref())
            .map(|bits| bits.test(code))
            .unwrap_or(false)
    }

    pub fn has_types(&self, types: &[u16]) -> bool {
        types.iter().all(|&t| self.has_type(t))
    }

    pub fn has_codes(&self, ev_type: u16, codes: &[u16]) -> bool {
        codes.iter().all(|&c| self.has_code(ev_type, c))
    }

    /// `true` iff, for every type except those in `ignored`, the device
    /// has that type if and only if it is listed in `required`. Used to
    /// identify "pure" devices (spec.md §4.B).
    pub fn match_types(&self, required: &[u16], ignored: &[u16]) -> bool {
        for ev_type in 0..EV_CNT as u16 {
            if ignored.contains(&ev_type) {
                continue;
            }
            let wanted = required.contains(&ev_type);
            if self.has_type(ev_type) != wanted {
                return false;
            }
        }
        true
    }

    /// `true` iff the device's full set of codes for `ev_type` equals
    /// `exact_set` (no more, no fewer).
    pub fn match_codes(&self, ev_type: u16, exact_set: &[u16]) -> bool {
        let Some(Some(bits)) = self.slots.get(ev_type as usize) else {
            return exact_set.is_empty();
        };
        for code in 0..bits.cnt() as u16 {
            let present = bits.test(code);
            let wanted = exact_set.contains(&code);
            if present != wanted {
                return false;
            }
        }
        true
    }

    /// Direct bit access, used by the classifier for probes that need
    /// the raw bitmap rather than a single-code query.
    pub fn bits(&self, ev_type: u16) -> Option<&EvdevBits> {
        self.slots.get(ev_type as usize).and_then(|s| s.as_ref())
    }

    /// Installs a fixture bitmap directly — used by other modules' tests
    /// (the classifier) to build `EvdevInfo` fixtures without a real fd.
    #[cfg(test)]
    pub(crate) fn merge_for_test(&mut self, ev_type: u16, bits: EvdevBits) {
        self.slots[ev_type as usize] = Some(bits);
    }

    /// Reads `EVIOCGKEY` into a fresh bitmap-shaped buffer; used once at
    /// startup for devices whose key state must be known immediately
    /// (§4.G initial state probing does the switch-only half of this;
    /// key state is read the same way for completeness).
    pub fn probe_key_state(fd: &File) -> anyhow::Result<EvdevBits> {
        let mut bits = EvdevBits::new(EV_KEY).expect("EV_KEY is supported");
        raw::ioctl_gkey(fd, raw_bytes_of(&mut bits))?;
        Ok(bits)
    }

    /// Reads `EVIOCGSW(SW_MAX)` into a fresh bitmap-shaped buffer: the
    /// current physical state of every switch the device owns. Used by
    /// the registry's initial switch state probe (§4.G).
    pub fn probe_switch_state(fd: &File) -> anyhow::Result<EvdevBits> {
        let mut bits = EvdevBits::new(super::codes::EV_SW).expect("EV_SW is supported");
        raw::ioctl_gsw(fd, raw_bytes_of(&mut bits))?;
        Ok(bits)
    }
}

/// `EVIOCGKEY`/`EVIOCGSW` fill the same shape of buffer as `EVIOCGBIT`
/// so we can reuse `EvdevBits`'s storage; this helper exposes that
/// storage mutably without making the field public.
fn raw_bytes_of(bits: &mut EvdevBits) -> &mut [u8] {
    bits.raw_bytes_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::evdev::codes::{EV_ABS, EV_KEY, EV_REL, EV_SW};

    fn info_with(types_and_codes: &[(u16, &[u16])]) -> EvdevInfo {
        let mut info = EvdevInfo::new();
        for &(ev_type, codes) in types_and_codes {
            let mut bits = EvdevBits::new(ev_type).unwrap();
            for &c in codes {
                bits.set_for_test(c);
            }
            info.slots[ev_type as usize] = Some(bits);
        }
        info
    }

    #[test]
    fn has_type_and_has_code() {
        let info = info_with(&[(EV_KEY, &[115, 114])]);
        assert!(info.has_type(EV_KEY));
        assert!(!info.has_type(EV_ABS));
        assert!(info.has_code(EV_KEY, 115));
        assert!(!info.has_code(EV_KEY, 1));
    }

    #[test]
    fn match_types_exact_set() {
        let info = info_with(&[(EV_KEY, &[115, 114])]);
        assert!(info.match_types(&[EV_KEY], &[]));
        assert!(!info.match_types(&[EV_KEY, EV_SW], &[]));
        // Ignoring EV_REP means its presence/absence doesn't matter.
        assert!(info.match_types(&[EV_KEY], &[EV_REL, EV_ABS, EV_SW]));
    }

    #[test]
    fn match_codes_exact_set() {
        let info = info_with(&[(EV_KEY, &[115, 114])]);
        assert!(info.match_codes(EV_KEY, &[114, 115]));
        assert!(!info.match_codes(EV_KEY, &[115]));
        assert!(!info.match_codes(EV_KEY, &[114, 115, 1]));
    }
}
