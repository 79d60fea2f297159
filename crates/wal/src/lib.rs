//! The write-ahead log (C7, §4.6): record framing for `MultiWrite`/
//! `VoteYes`/`Commit`/`Abort`, a dedicated writer thread that batches and
//! flushes them with configurable `fdatasync` policy, and a recovery reader
//! that reconstructs each transaction's durable state on restart.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod reader;
pub mod record;
pub mod writer;

pub use config::{SyncPolicy, WalConfig};
pub use reader::{group_by_tid, read_all, recover, RecoveredTx};
pub use record::{RecordKind, WalRecord};
pub use writer::{WalCompletionSink, WalWriter};
