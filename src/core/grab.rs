/// `InputGrabSM` (spec.md §4.H) — a reusable three-input / four-state
/// debouncing state machine shared by the touchscreen and volume-key
/// grab domains (`TsGrab`/`KpGrab` in [`super::grab_domains`]).
///
/// State is implicit in the tuple `(touching, touched, have_grab)`.
/// `have_grab` may only change while `touching=false ∧ touched=false`
/// (spec.md §8 universal invariant); the release timer exists solely to
/// keep `touched=true` for `release_delay_ms` after contact ends, so a
/// momentary lift-and-retouch doesn't cause a grab to be dropped and
/// immediately re-issued.
use tracing::debug;

/// Outcome of a release-timer firing, reported by the domain-specific
/// hook that may want one more look before fully releasing (palm
/// detection on touchscreens).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseVerify {
    StillHolding,
    Released,
}

pub struct InputGrabState {
    name: &'static str,
    touching: bool,
    touched: bool,
    want_grab: bool,
    have_grab: bool,
    release_delay_ms: u64,
    release_timer_pending: bool,
    grab_changed: Box<dyn FnMut(bool)>,
    release_verify: Box<dyn FnMut() -> ReleaseVerify>,
}

impl InputGrabState {
    pub fn new(
        name: &'static str,
        release_delay_ms: u64,
        grab_changed: impl FnMut(bool) + 'static,
        release_verify: impl FnMut() -> ReleaseVerify + 'static,
    ) -> Self {
        Self {
            name,
            touching: false,
            touched: false,
            want_grab: false,
            have_grab: false,
            release_delay_ms,
            release_timer_pending: false,
            grab_changed: Box::new(grab_changed),
            release_verify: Box::new(release_verify),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn have_grab(&self) -> bool {
        self.have_grab
    }

    pub fn release_delay_ms(&self) -> u64 {
        self.release_delay_ms
    }

    pub fn set_release_delay_ms(&mut self, ms: u64) {
        self.release_delay_ms = ms;
    }

    /// `touch`/`press` transitions. Returns `true` if a release timer
    /// should now be (re)armed by the caller's scheduler.
    pub fn set_touching(&mut self, touching: bool) -> bool {
        if touching {
            self.touching = true;
            self.touched = true;
            self.release_timer_pending = false;
            debug!(domain = self.name, "touch started, grab change deferred");
            false
        } else {
            let was_touching = self.touching;
            self.touching = false;
            if was_touching {
                self.release_timer_pending = true;
                debug!(domain = self.name, delay_ms = self.release_delay_ms, "arming release timer");
                true
            } else {
                false
            }
        }
    }

    pub fn set_want_grab(&mut self, want: bool) {
        self.want_grab = want;
        self.reconcile();
    }

    pub fn want_grab(&self) -> bool {
        self.want_grab
    }

    /// Called when the release timer fires. Consults `release_verify`;
    /// if it reports `StillHolding`, the timer must be re-armed by the
    /// caller (returns `true`). Otherwise clears `touched` and
    /// reconciles grab state.
    pub fn on_release_timer(&mut self) -> bool {
        if !self.release_timer_pending {
            return false;
        }
        match (self.release_verify)() {
            ReleaseVerify::StillHolding => true,
            ReleaseVerify::Released => {
                self.release_timer_pending = false;
                self.touched = false;
                self.reconcile();
                false
            }
        }
    }

    fn reconcile(&mut self) {
        if self.touching || self.touched {
            return;
        }
        if self.have_grab != self.want_grab {
            self.have_grab = self.want_grab;
            debug!(domain = self.name, have_grab = self.have_grab, "grab state changed");
            (self.grab_changed)(self.have_grab);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn harness() -> (InputGrabState, Rc<RefCell<Vec<bool>>>, Rc<RefCell<ReleaseVerify>>) {
        let changes = Rc::new(RefCell::new(Vec::new()));
        let verify_result = Rc::new(RefCell::new(ReleaseVerify::Released));
        let changes_cb = changes.clone();
        let verify_cb = verify_result.clone();
        let sm = InputGrabState::new(
            "test",
            100,
            move |g| changes_cb.borrow_mut().push(g),
            move || *verify_cb.borrow(),
        );
        (sm, changes, verify_result)
    }

    #[test]
    fn grab_applies_only_when_not_touching_and_not_touched() {
        let (mut sm, changes, _verify) = harness();
        sm.set_touching(true);
        sm.set_want_grab(true);
        assert!(!sm.have_grab(), "must not grab while touching");
        assert!(changes.borrow().is_empty());

        sm.set_touching(false);
        sm.on_release_timer();
        assert!(sm.have_grab());
        assert_eq!(*changes.borrow(), vec![true]);
    }

    #[test]
    fn scenario_5_palm_held_touch_keeps_grab_held() {
        let (mut sm, changes, verify) = harness();

        // Establish an initial grab.
        sm.set_touching(true);
        sm.set_want_grab(true);
        sm.set_touching(false);
        sm.on_release_timer();
        assert!(sm.have_grab());

        // Policy now wants the grab released, but a palm is still
        // resting on the panel through a new touch/lift cycle.
        sm.set_touching(true);
        sm.set_want_grab(false);
        sm.set_touching(false);

        *verify.borrow_mut() = ReleaseVerify::StillHolding;
        assert!(sm.on_release_timer());
        assert!(sm.on_release_timer());
        assert!(sm.on_release_timer());
        assert!(sm.have_grab(), "grab must persist through retries");
        assert_eq!(*changes.borrow(), vec![true]);

        *verify.borrow_mut() = ReleaseVerify::Released;
        assert!(!sm.on_release_timer());
        assert!(!sm.have_grab());
        assert_eq!(*changes.borrow(), vec![true, false]);
    }

    #[test]
    fn want_grab_change_while_touching_is_deferred() {
        let (mut sm, changes, _verify) = harness();
        sm.set_touching(true);
        sm.set_want_grab(true);
        sm.set_want_grab(false);
        assert!(changes.borrow().is_empty());
        sm.set_touching(false);
        sm.on_release_timer();
        assert!(!sm.have_grab());
    }
}
