//! Per-thread event scheduler (§4.2): a priority queue of `(when, handler,
//! data, {one-shot|periodic})` entries. The local `EventScheduler` task is
//! `TimedWaiting` until the earliest `when`; foreign threads enqueue events
//! via an immediate function rather than touching this queue directly
//! (§4.2, §5 ordering guarantees).

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

/// Opaque handle to a pre-registered event handler, looked up by the
/// scheduler when a timer fires. Handlers are registered once per thread
/// (mirroring `ImmediateFnId` registration in `gaia-scheduler::channel`)
/// rather than stored as trait objects in every heap entry, so cloning a
/// `ScheduledEvent` for inspection/logging stays cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandlerId(pub u32);

/// Whether a fired event is removed or rescheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Fires once, then is dropped.
    OneShot,
    /// Fires every `period`, rescheduled immediately after firing.
    Periodic { period: std::time::Duration },
}

struct Entry {
    when: Instant,
    handler: EventHandlerId,
    data: u64,
    recurrence: Recurrence,
    /// Monotonic insertion order, used only to break exact-`Instant` ties
    /// deterministically (oldest first) rather than relying on `Ord` for
    /// `Instant`-equal entries, which would otherwise be unspecified.
    seq: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
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
        (self.when, self.seq).cmp(&(other.when, other.seq))
    }
}

/// A fired event, handed back to the caller to dispatch to `handler`.
#[derive(Debug, Clone, Copy)]
pub struct FiredEvent {
    /// Which registered handler to invoke.
    pub handler: EventHandlerId,
    /// Opaque data passed through from registration.
    pub data: u64,
}

/// One thread's timer queue.
#[derive(Default)]
pub struct EventScheduler {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl EventScheduler {
    /// An empty queue.
    pub fn new() -> Self {
        EventScheduler::default()
    }

    /// Schedules `handler` to fire at `when`, carrying `data`, with the
    /// given recurrence.
    pub fn schedule_at(&mut self, when: Instant, handler: EventHandlerId, data: u64, recurrence: Recurrence) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry { when, handler, data, recurrence, seq }));
    }

    /// Convenience: schedules `handler` to fire after `delay` from now.
    pub fn schedule_after(&mut self, delay: std::time::Duration, handler: EventHandlerId, data: u64, recurrence: Recurrence) {
        self.schedule_at(Instant::now() + delay, handler, data, recurrence);
    }

    /// The `Instant` the scheduler task should be `TimedWaiting` until, if
    /// anything is queued.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.0.when)
    }

    /// Pops and returns every entry whose `when` is `<= now`, rescheduling
    /// periodic ones. Callers invoke this once per scheduler tick after
    /// waking from `next_deadline()`.
    pub fn drain_due(&mut self, now: Instant) -> Vec<FiredEvent> {
        let mut fired = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.when > now {
                break;
            }
            let Reverse(entry) = self.heap.pop().unwrap();
            fired.push(FiredEvent { handler: entry.handler, data: entry.data });
            if let Recurrence::Periodic { period } = entry.recurrence {
                self.schedule_at(entry.when + period, entry.handler, entry.data, entry.recurrence);
            }
        }
        fired
    }

    /// Number of entries still queued.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fires_in_deadline_order() {
        let mut sched = EventScheduler::new();
        let base = Instant::now();
        sched.schedule_at(base + Duration::from_millis(20), EventHandlerId(2), 0, Recurrence::OneShot);
        sched.schedule_at(base + Duration::from_millis(10), EventHandlerId(1), 0, Recurrence::OneShot);

        let fired = sched.drain_due(base + Duration::from_millis(15));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].handler, EventHandlerId(1));
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn periodic_reschedules_itself() {
        let mut sched = EventScheduler::new();
        let base = Instant::now();
        sched.schedule_at(base, EventHandlerId(7), 42, Recurrence::Periodic { period: Duration::from_millis(5) });

        let fired = sched.drain_due(base);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].data, 42);
        assert_eq!(sched.len(), 1);
        assert!(sched.next_deadline().unwrap() > base);
    }

    #[test]
    fn empty_queue_has_no_deadline() {
        let sched = EventScheduler::new();
        assert!(sched.next_deadline().is_none());
        assert!(sched.is_empty());
    }
}
