//! Splitter client-side load stats and split-request queue (C9, §4.7).
//! Only the client-facing surface is implemented here — the splitter
//! thread's own decision logic for how to physically carve up a COid
//! is a separate collaborator this crate only calls into.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod queue;
pub mod stats;

pub use queue::{throttle_delay, PendingSplit, SplitQueue};
pub use stats::{LoadStats, SplitCandidate};
