/// `Scheduler` (spec.md §2 component L, added) — the cancellable,
/// id-keyed deadline queue the reactor drains each loop iteration.
///
/// Grounded on the single-threaded cooperative model of §5: "no worker
/// threads... timers scheduled from inside a callback never fire inside
/// that callback." A timer's callback is never invoked synchronously
/// from `schedule`; it only ever runs from `drain_expired`, called by
/// the main loop between dispatches.
use std::cmp::Reverse;
use std::collections::BinaryHeap;

pub type TimerId = u64;

struct Entry {
    deadline_ms: u64,
    id: TimerId,
    callback: Box<dyn FnOnce()>,
    /// Timers whose callback re-arms a wakelock for the duration of the
    /// call (spec.md §5 "all timers carry a 'wakeup' variant").
    #[allow(dead_code)]
    wakeup: bool,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline_ms == other.deadline_ms && self.id == other.id
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline_ms.cmp(&other.deadline_ms).then(self.id.cmp(&other.id))
    }
}

#[derive(Default)]
pub struct Scheduler {
    heap: BinaryHeap<Reverse<Entry>>,
    next_id: TimerId,
    cancelled: std::collections::HashSet<TimerId>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_id: 1,
            cancelled: std::collections::HashSet::new(),
        }
    }

    /// Schedules `callback` to run `delay_ms` from `now_ms`. Returns an
    /// id that can cancel it; cancellation is idempotent (spec.md §5).
    pub fn schedule(&mut self, now_ms: u64, delay_ms: u64, callback: impl FnOnce() + 'static) -> TimerId {
        self.schedule_kind(now_ms, delay_ms, false, callback)
    }

    pub fn schedule_wakeup(&mut self, now_ms: u64, delay_ms: u64, callback: impl FnOnce() + 'static) -> TimerId {
        self.schedule_kind(now_ms, delay_ms, true, callback)
    }

    fn schedule_kind(
        &mut self,
        now_ms: u64,
        delay_ms: u64,
        wakeup: bool,
        callback: impl FnOnce() + 'static,
    ) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse(Entry {
            deadline_ms: now_ms + delay_ms,
            id,
            callback: Box::new(callback),
            wakeup,
        }));
        id
    }

    pub fn cancel(&mut self, id: TimerId) {
        self.cancelled.insert(id);
    }

    /// The deadline of the soonest still-live timer, for the reactor to
    /// compute a `poll(2)` timeout.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.heap.iter().map(|e| e.0.deadline_ms).min()
    }

    /// Runs every timer whose deadline is `<= now_ms`, in deadline order.
    /// Callbacks scheduled from inside a running callback land in the
    /// heap but are never drained within this same call, since they
    /// carry a `deadline_ms` strictly greater than `now_ms`.
    pub fn drain_expired(&mut self, now_ms: u64) {
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.deadline_ms > now_ms {
                break;
            }
            let Reverse(entry) = self.heap.pop().unwrap();
            if self.cancelled.remove(&entry.id) {
                continue;
            }
            (entry.callback)();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.heap.len()
    }
}
