//! Cooperative task contract (§4.2, §5): a task never blocks its OS
//! thread. Each call to [`Task::poll_task`] must return quickly and report
//! one of the four states the scheduler understands.
//!
//! Grounded in the original's `ti->State`-pointer state machine (§9 DESIGN
//! NOTES row "Cooperative tasks with state encoded in `ti->State`
//! pointer"), expressed here as the idiomatic Rust form the same row
//! recommends: "Explicit state-machine enum per RPC handler". `TaskState`
//! is that enum's *scheduler-visible* shape; each handler (in
//! `gaia-server`) keeps its own private state machine behind `poll_task`.

use std::time::Instant;

/// What a task wants the scheduler to do after one `poll_task` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Still has work to do; poll again on the next scheduler tick.
    Running,
    /// Suspended until a message arrives in this task's mailbox.
    Waiting,
    /// Suspended until `Instant` elapses, *or* a message arrives, whichever
    /// is first.
    TimedWaiting(Instant),
    /// Finished; the scheduler drops this task after this call.
    Ending,
}

/// A unique id for a task within one `TaskScheduler`'s registry. Foreign
/// threads address a task as `(thread_id, TaskId)` (§4.2 "globally
/// addressable `(thread,fixed-task)` pair").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// One cooperative task. Implementors must never issue a blocking OS call
/// from `poll_task` — the only sanctioned suspension points are returning
/// `Waiting`/`TimedWaiting` (§5 "Suspension points").
pub trait Task: Send {
    /// Advances this task by one step. `mailbox` holds messages delivered
    /// to this task since the last poll, oldest first; `poll_task` should
    /// drain it before returning `Running`, since the scheduler does not
    /// redeliver undrained messages.
    fn poll_task(&mut self, mailbox: &mut Vec<super::channel::Message>) -> TaskState;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Message;

    struct CountToThree(u32);
    impl Task for CountToThree {
        fn poll_task(&mut self, _mailbox: &mut Vec<Message>) -> TaskState {
            self.0 += 1;
            if self.0 < 3 {
                TaskState::Running
            } else {
                TaskState::Ending
            }
        }
    }

    #[test]
    fn runs_until_ending() {
        let mut t = CountToThree(0);
        let mut mailbox = Vec::new();
        assert_eq!(t.poll_task(&mut mailbox), TaskState::Running);
        assert_eq!(t.poll_task(&mut mailbox), TaskState::Running);
        assert_eq!(t.poll_task(&mut mailbox), TaskState::Ending);
    }
}
