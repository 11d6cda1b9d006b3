/// `EventMapper` — config-driven event code rewriting (spec.md §4.D).
///
/// Each rule is a `(from, to)` pair of symbolic names, resolved once at
/// construction via `codes::resolve_name`. `apply()` rewrites matching
/// `EV_KEY`/`EV_SW` events in place; rules for any other event type are
/// dropped at load time with a warning, since only key and switch codes
/// are translatable per spec.md §4.D.
use tracing::warn;

use super::codes::{resolve_name, SW_MAX};
use super::raw::InputEvent;
use crate::core::config::ConfigStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMapping {
    pub from_type: u16,
    pub from_code: u16,
    pub to_type: u16,
    pub to_code: u16,
}

#[derive(Debug, Clone, Default)]
pub struct EventMapper {
    rules: Vec<EventMapping>,
}

impl EventMapper {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Loads `[evdev]` group entries from a config store: each
    /// `key = value` pair is a symbolic-name remap rule. Entries whose
    /// name does not resolve (unknown symbol, or a type other than
    /// `EV_KEY`/`EV_SW`) are skipped with a warning rather than failing
    /// the whole load.
    pub fn from_store(store: &dyn ConfigStore, group: &str) -> Self {
        let mut mapper = Self::new();
        for (key, value) in store.group_keys(group) {
            let (Some((from_type, from_code)), Some((to_type, to_code))) =
                (resolve_name(key), resolve_name(value))
            else {
                warn!(rule = %key, target = %value, "unresolvable evdev remap rule, skipping");
                continue;
            };
            mapper.rules.push(EventMapping {
                from_type,
                from_code,
                to_type,
                to_code,
            });
        }
        mapper
    }

    pub fn add_rule(&mut self, mapping: EventMapping) {
        self.rules.push(mapping);
    }

    pub fn rules(&self) -> &[EventMapping] {
        &self.rules
    }

    /// Rewrites `event` in place if a rule matches its `(type, code)`.
    /// Linear scan, first match wins; only `EV_KEY`/`EV_SW` events are
    /// ever matched since those are the only resolvable rule types.
    pub fn apply(&self, event: &mut InputEvent) {
        for rule in &self.rules {
            if event.ev_type == rule.from_type && event.code == rule.from_code {
                event.ev_type = rule.to_type;
                event.code = rule.to_code;
                return;
            }
        }
    }

    /// Given a switch code the policy wants to watch for (`expected`),
    /// returns the *physical* switch code that should be probed at
    /// startup (spec.md §4.D):
    ///
    /// - if a rule remaps some physical code to `expected`, that physical
    ///   code is returned;
    /// - else, if `expected` is itself the physical source of a rule
    ///   targeting something else, the kernel never reports `expected`
    ///   with that meaning, so `SW_MAX` (a code the kernel never sets) is
    ///   returned, making the probe read "absent";
    /// - otherwise `expected` is unmapped and is returned unchanged.
    pub fn reverse_lookup_switch(&self, expected: u16) -> u16 {
        let is_sw = |r: &EventMapping| {
            r.from_type == super::codes::EV_SW && r.to_type == super::codes::EV_SW
        };
        for rule in &self.rules {
            if is_sw(rule) && rule.to_code == expected {
                return rule.from_code;
            }
        }
        for rule in &self.rules {
            if is_sw(rule) && rule.from_code == expected && rule.to_code != expected {
                return SW_MAX;
            }
        }
        expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::MapConfigStore;
    use crate::core::evdev::codes::{EV_KEY, EV_SW, KEY_CAMERA, KEY_SCREENLOCK, SW_KEYPAD_SLIDE, SW_LID};

    #[test]
    fn apply_rewrites_matching_key_event() {
        let mut mapper = EventMapper::new();
        mapper.add_rule(EventMapping {
            from_type: EV_KEY,
            from_code: KEY_CAMERA,
            to_type: EV_KEY,
            to_code: KEY_SCREENLOCK,
        });
        let mut event = InputEvent::new(EV_KEY, KEY_CAMERA, 1);
        mapper.apply(&mut event);
        assert_eq!(event.code, KEY_SCREENLOCK);
    }

    #[test]
    fn apply_leaves_unmatched_event_untouched() {
        let mapper = EventMapper::new();
        let mut event = InputEvent::new(EV_KEY, KEY_CAMERA, 1);
        mapper.apply(&mut event);
        assert_eq!(event.code, KEY_CAMERA);
    }

    #[test]
    fn reverse_lookup_finds_remapped_physical_switch() {
        let mut mapper = EventMapper::new();
        mapper.add_rule(EventMapping {
            from_type: EV_SW,
            from_code: SW_KEYPAD_SLIDE,
            to_type: EV_SW,
            to_code: SW_LID,
        });
        assert_eq!(mapper.reverse_lookup_switch(SW_LID), SW_KEYPAD_SLIDE);
    }

    #[test]
    fn reverse_lookup_returns_expected_when_wholly_unmapped() {
        let mapper = EventMapper::new();
        assert_eq!(mapper.reverse_lookup_switch(SW_LID), SW_LID);
    }

    #[test]
    fn reverse_lookup_returns_sentinel_when_physical_code_means_something_else() {
        // SW_LID -> SW_FRONT_PROXIMITY exists (scenario 1 of spec.md §8):
        // querying SW_LID directly must not be mistaken for the physical
        // wire value, since that code now carries a different meaning.
        let mut mapper = EventMapper::new();
        mapper.add_rule(EventMapping {
            from_type: EV_SW,
            from_code: SW_LID,
            to_type: EV_SW,
            to_code: crate::core::evdev::codes::SW_FRONT_PROXIMITY,
        });
        assert_eq!(mapper.reverse_lookup_switch(SW_LID), SW_MAX);
    }

    #[test]
    fn from_store_skips_unresolvable_rule() {
        let mut store = MapConfigStore::new();
        store.set("EVDEV", "NOT_A_KEY", "KEY_CAMERA");
        store.set("EVDEV", "KEY_CAMERA", "KEY_SCREENLOCK");
        let mapper = EventMapper::from_store(&store, "EVDEV");
        assert_eq!(mapper.rules().len(), 1);
        assert_eq!(mapper.rules()[0].from_code, KEY_CAMERA);
    }
}
