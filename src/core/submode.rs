/// Concurrent policy-state bitmask (spec.md §3 `Submode`). The
/// authoritative value lives on the external datapipe bus; `TklockSM`
/// only ever adds/removes bits transactionally through [`Datapipe`],
/// never holds its own copy as ground truth.
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Submode: u32 {
        const TKLOCK            = 0b0000_0000_0001;
        const EVENT_EATER       = 0b0000_0000_0010;
        const VISUAL_TKLOCK     = 0b0000_0000_0100;
        const AUTORELOCK        = 0b0000_0000_1000;
        const PROXIMITY_TKLOCK  = 0b0000_0001_0000;
        const POCKET            = 0b0000_0010_0000;
        const BOOTUP            = 0b0000_0100_0000;
        const SOFTOFF           = 0b0000_1000_0000;
        const MALF              = 0b0001_0000_0000;
    }
}

use super::datapipe::Datapipe;

/// Adds `bits` to the submode datapipe and re-publishes, returning the
/// new value. A no-op publish (bits already all set) still republishes,
/// matching the bus's synchronous, unconditional delivery model.
pub fn add(pipe: &mut Datapipe<Submode>, bits: Submode) -> Submode {
    let current = pipe.cached().copied().unwrap_or_default();
    pipe.publish(current | bits)
}

pub fn remove(pipe: &mut Datapipe<Submode>, bits: Submode) -> Submode {
    let current = pipe.cached().copied().unwrap_or_default();
    pipe.publish(current & !bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_are_transactional() {
        let mut pipe = Datapipe::new("submode");
        pipe.publish(Submode::BOOTUP);
        let after_add = add(&mut pipe, Submode::TKLOCK | Submode::EVENT_EATER);
        assert!(after_add.contains(Submode::BOOTUP));
        assert!(after_add.contains(Submode::TKLOCK));
        assert!(after_add.contains(Submode::EVENT_EATER));

        let after_remove = remove(&mut pipe, Submode::EVENT_EATER);
        assert!(after_remove.contains(Submode::TKLOCK));
        assert!(!after_remove.contains(Submode::EVENT_EATER));
    }
}
