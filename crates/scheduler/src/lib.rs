//! The cooperative task scheduler and per-thread messaging fabric (C3,
//! §4.2, §5): a `Task` trait with an explicit `{Running, Waiting,
//! TimedWaiting, Ending}` contract, bounded per-`(src, dst)`-thread-pair
//! channels carrying either a task reference or an immediate-function id,
//! and a per-thread event scheduler for timers.
//!
//! `gaia-net`'s connection/RPC tasks and `gaia-server`'s RPC handler tasks
//! are both built on top of this crate's [`Task`] trait; the scheduler
//! itself is transport-agnostic.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod event;
pub mod immediate;
pub mod scheduler;
pub mod task;

pub use channel::{channel, ChannelFull, Dispatch, ImmediateFnId, Message, Receiver, Sender, INLINE_PAYLOAD_LEN};
pub use event::{EventHandlerId, EventScheduler, FiredEvent, Recurrence};
pub use immediate::{ImmediateFn, ImmediateTable};
pub use scheduler::TaskScheduler;
pub use task::{Task, TaskId, TaskState};
