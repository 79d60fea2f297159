//! Outcome of [`crate::LogOneObjectInMemory::read`] (§4.4.2). `TOO_OLD`,
//! `PENDING`, and `CORRUPTED` are carried as `gaia_core::Error` variants
//! (they are client-visible statuses per §7); only the deferred path needs
//! its own success-shaped variant since it isn't an error at all.

use gaia_core::Ts;
use gaia_pendingtx::TxUpdateCoid;
use std::sync::Arc;

/// What a snapshot read produced.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A readable value was found.
    Found {
        /// The effect to read cells/attrs from (a checkpoint-carrying
        /// tucoid: either the original checkpoint, or a materialized
        /// forward-walk result).
        tucoid: Arc<TxUpdateCoid>,
        /// The commit timestamp actually read (may differ from the
        /// requested timestamp when it was [`Ts::illegal`]).
        read_ts: Ts,
    },
    /// A deferred reader was registered on the blocking pending entry; the
    /// caller should suspend this RPC and wait to be woken.
    Deferred,
}
