//! `PendingTx`: the process-wide `Tid -> PendingTxInfo` table (§3.5).
//!
//! The table itself is lock-striped (a `DashMap`, mirroring the teacher's
//! use of `dashmap` for exactly this shape of map). Per spec §5, a given
//! tid's state is only ever touched by the single worker thread the
//! scheduler deterministically routes that tid's RPCs to, so contention on
//! an individual `PendingTxInfo`'s lock is not expected in practice; we
//! still guard it with a `parking_lot::Mutex` rather than relying on
//! `unsafe` aliasing assumptions Rust cannot check for us.

use dashmap::DashMap;
use gaia_core::{Coid, Tid};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::raw::TxRawCoid;

/// Lifecycle state of a pending transaction (§4.8 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Buffering reads/writes, not yet prepared.
    InProgress,
    /// Prepared and voted YES; has a pending SLEIM in every touched COid.
    VotedYes,
    /// Prepared and voted NO; no pending SLEIMs were inserted.
    VotedNo,
    /// Aborted and pending entries cleared.
    ClearedAbort,
}

/// Per-transaction state: status, cachability, and this transaction's raw
/// update list per touched COid.
#[derive(Debug)]
pub struct PendingTxInfo {
    /// Current lifecycle state.
    pub status: TxStatus,
    /// Whether this transaction's compressed updates may be cached for
    /// reuse (false once partially replayed from a WAL with format quirks
    /// that prevent safe caching, see `gaia-wal`).
    pub updates_cachable: bool,
    coidinfo: FxHashMap<Coid, TxRawCoid>,
}

impl Default for PendingTxInfo {
    fn default() -> Self {
        PendingTxInfo {
            status: TxStatus::InProgress,
            updates_cachable: true,
            coidinfo: FxHashMap::default(),
        }
    }
}

impl PendingTxInfo {
    /// Gets or creates the raw update list for `coid`.
    pub fn raw_coid_mut(&mut self, coid: Coid) -> &mut TxRawCoid {
        self.coidinfo.entry(coid).or_default()
    }

    /// Borrows the raw update list for `coid`, if this transaction has
    /// touched it.
    pub fn raw_coid(&self, coid: &Coid) -> Option<&TxRawCoid> {
        self.coidinfo.get(coid)
    }

    /// Every COid this transaction has touched.
    pub fn coids(&self) -> impl Iterator<Item = &Coid> {
        self.coidinfo.keys()
    }

    /// Drops a COid entirely from this transaction (used after
    /// `abort_level` empties its raw list).
    pub fn remove_coid(&mut self, coid: &Coid) {
        self.coidinfo.remove(coid);
    }

    /// Applies `abortLevel(level)` to every touched COid, dropping any COid
    /// whose raw list becomes empty (§4.5 subtransaction semantics).
    pub fn abort_level(&mut self, level: i16) {
        self.coidinfo.retain(|_, raw| !raw.abort_level(level));
    }

    /// Applies `releaseLevel(level)` to every touched COid's raw list.
    pub fn release_level(&mut self, level: i16) {
        for raw in self.coidinfo.values_mut() {
            raw.release_level(level);
        }
    }
}

/// The process-wide pending-transaction table.
#[derive(Default)]
pub struct PendingTx {
    infos: DashMap<Tid, Arc<Mutex<PendingTxInfo>>>,
}

impl PendingTx {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up (or creates) the `PendingTxInfo` handle for `tid`. The
    /// second return value is `true` if a new entry was created.
    pub fn get_info(&self, tid: Tid) -> (Arc<Mutex<PendingTxInfo>>, bool) {
        if let Some(existing) = self.infos.get(&tid) {
            return (Arc::clone(&existing), false);
        }
        let created = Arc::new(Mutex::new(PendingTxInfo::default()));
        match self.infos.entry(tid) {
            dashmap::mapref::entry::Entry::Occupied(e) => (Arc::clone(e.get()), false),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(Arc::clone(&created));
                (created, true)
            }
        }
    }

    /// Removes `tid`'s entry entirely (after commit/abort finalizes it).
    pub fn remove_info(&self, tid: &Tid) {
        self.infos.remove(tid);
    }

    /// Number of in-flight transactions tracked (for admin/status RPCs).
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// True if no transactions are tracked.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::TxOp;
    use gaia_core::{CellKey, ListCell};

    #[test]
    fn get_info_creates_once() {
        let table = PendingTx::new();
        let tid = Tid::new();
        let (_, created1) = table.get_info(tid);
        let (_, created2) = table.get_info(tid);
        assert!(created1);
        assert!(!created2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_info_drops_entry() {
        let table = PendingTx::new();
        let tid = Tid::new();
        table.get_info(tid);
        table.remove_info(&tid);
        assert!(table.is_empty());
    }

    #[test]
    fn abort_level_drops_emptied_coids() {
        let mut info = PendingTxInfo::default();
        let coid = Coid::new(0, 1);
        info.raw_coid_mut(coid).push(
            TxOp::Add { cell: ListCell { key: CellKey::Int(1), value: 1 }, prki: None },
            1,
        );
        info.abort_level(0);
        assert!(info.raw_coid(&coid).is_none());
    }
}
