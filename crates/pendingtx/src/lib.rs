//! Pending-transaction table (C5): accumulates a transaction's per-COid
//! updates, compresses them into a conflict-checkable `TxUpdateCoid`, and
//! tracks subtransaction (savepoint) levels.

#![warn(clippy::all)]

pub mod conflict;
pub mod raw;
pub mod table;
pub mod tucoid;

pub use conflict::{has_conflicts, ConflictPolicy};
pub use raw::{TxListItem, TxOp, TxRawCoid};
pub use table::{PendingTx, PendingTxInfo, TxStatus};
pub use tucoid::{Checkpoint, ListOp, TxUpdateCoid};
