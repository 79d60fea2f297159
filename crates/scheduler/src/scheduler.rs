//! `TaskScheduler`: the cooperative loop one pinned worker thread runs
//! (§4.2, §5). Owns every task registered on this thread, the inbound
//! ends of every `(peer, this)` channel, the immediate-function table, and
//! the local event scheduler.
//!
//! Grounded in the original's per-thread dispatch loop (`slauncher.cpp`'s
//! `SLauncher::run`): drain inbound messages, route task-addressed ones to
//! mailboxes (waking `Waiting` tasks to `Running`), invoke immediate
//! functions inline, poll every runnable task once, then park on the sleep
//! event-fd until the next message or the nearest timer deadline — here
//! represented by [`TaskScheduler::tick`] plus [`TaskScheduler::next_wake`]
//! rather than an actual `epoll_wait`, since the scheduler itself is
//! transport-agnostic (the real waiting happens in whatever async runtime
//! drives `gaia-net`'s connection tasks; see `DESIGN.md`).

use crate::channel::{Dispatch, Message, Receiver};
use crate::event::{EventScheduler, FiredEvent};
use crate::immediate::ImmediateTable;
use crate::task::{Task, TaskId, TaskState};
use rustc_hash::FxHashMap;
use std::time::Instant;
use tracing::trace;

struct Slot {
    task: Box<dyn Task>,
    mailbox: Vec<Message>,
    state: TaskState,
}

/// One pinned worker thread's cooperative scheduler.
pub struct TaskScheduler {
    tasks: FxHashMap<TaskId, Slot>,
    inbound: Vec<Receiver>,
    immediate: ImmediateTable,
    events: EventScheduler,
    next_task_id: u64,
}

impl TaskScheduler {
    /// A scheduler with no tasks, no inbound channels, and an empty event
    /// queue.
    pub fn new() -> Self {
        TaskScheduler {
            tasks: FxHashMap::default(),
            inbound: Vec::new(),
            immediate: ImmediateTable::new(),
            events: EventScheduler::new(),
            next_task_id: 0,
        }
    }

    /// Registers the receiving end of an inbound `(peer, this)` channel;
    /// its messages are drained on every tick.
    pub fn add_inbound(&mut self, rx: Receiver) {
        self.inbound.push(rx);
    }

    /// Mutable access to this thread's immediate-function table, for
    /// registering callbacks at startup.
    pub fn immediate_table_mut(&mut self) -> &mut ImmediateTable {
        &mut self.immediate
    }

    /// Mutable access to this thread's event scheduler.
    pub fn events_mut(&mut self) -> &mut EventScheduler {
        &mut self.events
    }

    /// Spawns `task` in the `Running` state, returning its `TaskId`.
    pub fn spawn(&mut self, task: Box<dyn Task>) -> TaskId {
        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;
        self.tasks.insert(id, Slot { task, mailbox: Vec::new(), state: TaskState::Running });
        id
    }

    /// Number of live tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// The instant this thread should next wake for — the earliest of any
    /// `TimedWaiting` task and the event scheduler's next deadline. `None`
    /// means "only a message can wake this thread" (§5 suspension points).
    pub fn next_wake(&self) -> Option<Instant> {
        let timed_tasks = self.tasks.values().filter_map(|s| match s.state {
            TaskState::TimedWaiting(at) => Some(at),
            _ => None,
        });
        timed_tasks.chain(self.events.next_deadline()).min()
    }

    /// Drains every inbound channel, routing `Task`-addressed messages into
    /// mailboxes (waking `Waiting`/`TimedWaiting` tasks to `Running`) and
    /// invoking `Immediate`-addressed ones inline, in the order drained
    /// (FIFO within one `(src, dst)` pair per §5, no cross-channel
    /// ordering guarantee per §4.2).
    pub fn drain_inbound(&mut self) {
        let mut buf = Vec::new();
        for rx in &self.inbound {
            buf.clear();
            rx.drain_into(&mut buf);
            for msg in buf.drain(..) {
                match msg.dispatch {
                    Dispatch::Task(id) => {
                        if let Some(slot) = self.tasks.get_mut(&id) {
                            slot.mailbox.push(msg);
                            if matches!(slot.state, TaskState::Waiting | TaskState::TimedWaiting(_)) {
                                slot.state = TaskState::Running;
                            }
                        } else {
                            trace!(task = id.0, "message for unknown/already-ended task dropped");
                        }
                    }
                    Dispatch::Immediate(fn_id) => self.immediate.invoke(fn_id, msg.bytes()),
                }
            }
        }
    }

    /// Fires every event due at or before `now` and dispatches each to its
    /// registered immediate function (events carry no task mailbox of
    /// their own — a handler that needs to reach a task does so by
    /// invoking its own registered immediate function, which then routes
    /// to a mailbox exactly like a foreign-thread message would).
    pub fn drain_events(&mut self, now: Instant) -> Vec<FiredEvent> {
        let fired = self.events.drain_due(now);
        for f in &fired {
            self.immediate.invoke(f.handler.into(), &f.data.to_le_bytes());
        }
        fired
    }

    /// Polls every task currently `Running`, or `TimedWaiting`/`Waiting`
    /// whose deadline has elapsed or whose mailbox is non-empty. Ended
    /// tasks are removed. Returns the number of tasks polled this tick.
    pub fn run_once(&mut self, now: Instant) -> usize {
        self.drain_inbound();
        self.drain_events(now);

        let mut polled = 0;
        let mut ended = Vec::new();
        for (id, slot) in self.tasks.iter_mut() {
            let runnable = match slot.state {
                TaskState::Running => true,
                TaskState::Waiting => !slot.mailbox.is_empty(),
                TaskState::TimedWaiting(at) => at <= now || !slot.mailbox.is_empty(),
                TaskState::Ending => false,
            };
            if !runnable {
                continue;
            }
            polled += 1;
            slot.state = slot.task.poll_task(&mut slot.mailbox);
            slot.mailbox.clear();
            if slot.state == TaskState::Ending {
                ended.push(*id);
            }
        }
        for id in ended {
            self.tasks.remove(&id);
        }
        polled
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        TaskScheduler::new()
    }
}

impl From<crate::event::EventHandlerId> for crate::channel::ImmediateFnId {
    fn from(h: crate::event::EventHandlerId) -> Self {
        crate::channel::ImmediateFnId(h.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{channel, Dispatch, Message};
    use std::sync::Arc;
    use std::time::Duration;

    struct Echo(u32);
    impl Task for Echo {
        fn poll_task(&mut self, mailbox: &mut Vec<Message>) -> TaskState {
            if mailbox.is_empty() {
                TaskState::Waiting
            } else {
                self.0 += mailbox.len() as u32;
                if self.0 >= 3 {
                    TaskState::Ending
                } else {
                    TaskState::Waiting
                }
            }
        }
    }

    #[test]
    fn message_wakes_a_waiting_task() {
        let mut sched = TaskScheduler::new();
        let id = sched.spawn(Box::new(Echo(0)));
        sched.run_once(Instant::now()); // first poll: empty mailbox -> Waiting

        let (tx, rx) = channel(4, Arc::new(|| {}));
        sched.add_inbound(rx);
        tx.try_send(Message::new(Dispatch::Task(id), &[])).unwrap();

        sched.run_once(Instant::now());
        assert_eq!(sched.task_count(), 1); // 1 msg, not yet ending
        tx.try_send(Message::new(Dispatch::Task(id), &[])).unwrap();
        tx.try_send(Message::new(Dispatch::Task(id), &[])).unwrap();
        sched.run_once(Instant::now());
        assert_eq!(sched.task_count(), 0); // ended and reaped
    }

    #[test]
    fn timed_waiting_task_runs_once_deadline_passes() {
        struct Once(bool);
        impl Task for Once {
            fn poll_task(&mut self, _mailbox: &mut Vec<Message>) -> TaskState {
                if self.0 {
                    TaskState::Ending
                } else {
                    self.0 = true;
                    TaskState::TimedWaiting(Instant::now() + Duration::from_millis(10))
                }
            }
        }
        let mut sched = TaskScheduler::new();
        sched.spawn(Box::new(Once(false)));
        let now = Instant::now();
        sched.run_once(now);
        assert_eq!(sched.task_count(), 1);
        // deadline not elapsed yet: no poll happens, task stays alive
        sched.run_once(now);
        assert_eq!(sched.task_count(), 1);
        sched.run_once(now + Duration::from_millis(11));
        assert_eq!(sched.task_count(), 0);
    }

    #[test]
    fn immediate_function_runs_inline_at_drain_time() {
        use crate::channel::ImmediateFnId;
        let mut sched = TaskScheduler::new();
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag2 = Arc::clone(&flag);
        sched.immediate_table_mut().register(ImmediateFnId(1), Arc::new(move |_| {
            flag2.store(true, std::sync::atomic::Ordering::SeqCst);
        }));
        let (tx, rx) = channel(4, Arc::new(|| {}));
        sched.add_inbound(rx);
        tx.try_send(Message::new(Dispatch::Immediate(ImmediateFnId(1)), &[])).unwrap();
        sched.run_once(Instant::now());
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }
}
