//! The per-COid in-memory MVCC log (§3.4, §4.4): `LogOneObjectInMemory`
//! holds an ordered chain of checkpoint/delta/snapshot entries
//! (`SingleLogEntryInMemory`) plus a pending-entries chain used to block or
//! defer reads against not-yet-committed transactions. `LogInMemory` is the
//! COid-keyed table of these, backed by a per-COid disk checkpoint store.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod looim;
pub mod readoutcome;
pub mod sleim;
pub mod store;
pub mod table;

pub use config::LogConfig;
pub use looim::{LogOneObjectInMemory, PendingRef};
pub use readoutcome::ReadOutcome;
pub use sleim::{DeferredReader, SingleLogEntryInMemory};
pub use store::{DiskStorage, RowidAllocator};
pub use table::LogInMemory;
