//! `SingleLogEntryInMemory` (SLEIM): one entry in a COid's log or pending
//! chain (§3.4), grounded in `logmem.h`'s `SingleLogEntryInMemory` /
//! `WaitingListItem`.

use gaia_core::Ts;
use gaia_pendingtx::TxUpdateCoid;
use std::sync::Arc;

/// SLEIM flag bits, matching the original's `SLEIM_FLAG_*` `#define`s
/// (`logmem.h`): a plain bitmask rather than a bitflags crate, since the
/// workspace has no existing dependency on one and two bits don't warrant
/// adding it.
pub mod sleim_flags {
    /// Entry not yet written to the WAL/checkpoint file.
    pub const DIRTY: u8 = 0x01;
    /// Entry was synthesized by a read to cache a materialized
    /// forward-walk result, rather than recorded by a write.
    pub const SNAPSHOT: u8 = 0x04;
}

/// SLEIM flags bitmask (`sleim_flags::{DIRTY, SNAPSHOT}`).
pub type SleimFlags = u8;

/// A deferred reader waiting on a pending SLEIM to resolve (§4.4.2 step 2,
/// §4.4.5 deferred-reader wake-up). Decoupled from the scheduler/transport
/// layer: anything that can be told "the timestamp you were blocked on is
/// resolved" implements this.
pub trait DeferredReader: Send + Sync {
    /// Called once, when every pending entry at or below this reader's
    /// threshold timestamp has been finalized (committed or aborted).
    /// `read_ts` is the timestamp the reader should now retry at.
    fn wake(&self, read_ts: Ts);
}

/// One `(deferred reader, threshold timestamp)` entry on a pending SLEIM's
/// waiter list (`WaitingListItem` in the original).
pub struct Waiter {
    /// The deferred reader to wake.
    pub handle: Arc<dyn DeferredReader>,
    /// The reader is woken only once no remaining pending entry has
    /// `ts <= threshold`.
    pub threshold: Ts,
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter").field("threshold", &self.threshold).finish()
    }
}

/// One log or pending entry.
#[derive(Debug)]
pub struct SingleLogEntryInMemory {
    /// Commit timestamp (`logentries`) or prepared timestamp
    /// (`pendingentries`).
    pub ts: Ts,
    /// `SleimFlags::DIRTY` / `SleimFlags::SNAPSHOT`.
    pub flags: SleimFlags,
    /// This transaction's compressed effect on the owning COid.
    pub tucoid: Arc<TxUpdateCoid>,
    /// Deferred readers blocked on this entry (only meaningful while this
    /// entry lives in `pendingentries`).
    pub waiters: Vec<Waiter>,
    /// Highest threshold among `waiters`, returned to the client on commit
    /// so it can catch its clock up (§3.4).
    pub waitingts: Option<Ts>,
}

impl SingleLogEntryInMemory {
    /// A committed checkpoint or delta entry for `logentries`.
    pub fn new_log(ts: Ts, tucoid: Arc<TxUpdateCoid>, dirty: bool) -> Self {
        let flags = if dirty { sleim_flags::DIRTY } else { 0 };
        SingleLogEntryInMemory {
            ts,
            flags,
            tucoid,
            waiters: Vec::new(),
            waitingts: None,
        }
    }

    /// A synthesized snapshot entry caching a materialized forward walk
    /// (§4.4.2 step 7).
    pub fn new_snapshot(ts: Ts, tucoid: Arc<TxUpdateCoid>) -> Self {
        SingleLogEntryInMemory {
            ts,
            flags: sleim_flags::SNAPSHOT,
            tucoid,
            waiters: Vec::new(),
            waitingts: None,
        }
    }

    /// A prepared-but-not-yet-committed entry for `pendingentries`.
    pub fn new_pending(ts: Ts, tucoid: Arc<TxUpdateCoid>) -> Self {
        SingleLogEntryInMemory {
            ts,
            flags: sleim_flags::DIRTY,
            tucoid,
            waiters: Vec::new(),
            waitingts: None,
        }
    }

    /// True if this entry's tucoid is a checkpoint (Write/WriteSV).
    pub fn is_checkpoint(&self) -> bool {
        self.tucoid.has_checkpoint()
    }

    /// Registers a deferred reader, updating `waitingts`.
    pub fn add_waiter(&mut self, handle: Arc<dyn DeferredReader>, threshold: Ts) {
        self.waitingts = Some(match self.waitingts {
            Some(existing) if existing >= threshold => existing,
            _ => threshold,
        });
        self.waiters.push(Waiter { handle, threshold });
    }
}
