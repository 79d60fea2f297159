//! `LogOneObjectInMemory` (looim): the per-COid MVCC log (§3.4, §4.4),
//! grounded in `logmem.{h,cpp}`'s `LogOneObjectInMemory` / `readCOid` /
//! `writeCOid` / `gClog`.
//!
//! One deliberate departure from the original: `readCOid` synthesizes a
//! cached snapshot entry by inserting it at the *same* timestamp as the log
//! entry it was derived from (`logmem.cpp` `readCOid`, the `addBefore`
//! call), which would leave two entries sharing a timestamp — something
//! §3.4 states as an invariant logmem must not violate. We resolve the
//! tension by *replacing* that entry in place with the materialized
//! checkpoint rather than inserting an extra one alongside it; this keeps
//! timestamps unique and still gives every later read at that timestamp (or
//! up to the next real entry) an O(1) checkpoint to start from, which is the
//! optimization's entire purpose. Recorded in `DESIGN.md`.

use gaia_core::{Error, RcKeyInfo, Result, Ts};
use gaia_pendingtx::{has_conflicts, Checkpoint, ConflictPolicy, TxUpdateCoid};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

use crate::config::LogConfig;
use crate::readoutcome::ReadOutcome;
use crate::sleim::{sleim_flags, DeferredReader, SingleLogEntryInMemory};

/// Opaque handle to a pending entry, returned by [`LogOneObjectInMemory::add_pending`]
/// and consumed by [`LogOneObjectInMemory::remove_or_move_pending`]. Carries
/// a monotonic sequence number rather than a `Vec` index, since the vector
/// reshuffles on every insertion/removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRef(u64);

struct PendingSlot {
    seq: u64,
    sleim: SingleLogEntryInMemory,
}

struct LooimInner {
    logentries: Vec<SingleLogEntryInMemory>,
    pendingentries: Vec<PendingSlot>,
    last_read: Ts,
    next_pending_seq: u64,
}

/// The in-memory log for one COid: an ordered chain of committed
/// checkpoint/delta/snapshot entries, a chain of prepared-but-uncommitted
/// entries, and the highest timestamp ever read.
///
/// Each mutating/reading operation takes the object's lock itself for the
/// duration of the call, rather than handing callers a guard to hold across
/// an RPC — the original's `getAndLock`/`unlock` pair is collapsed into
/// this crate's `RwLock<LooimInner>` usage internally. See `DESIGN.md`.
pub struct LogOneObjectInMemory {
    inner: RwLock<LooimInner>,
}

impl LogOneObjectInMemory {
    /// A fresh object seeded with a single checkpoint entry (loaded from
    /// disk, or a synthesized empty value at `Ts::lowest()` — §4.4.1).
    pub fn new_with_checkpoint(ts: Ts, tucoid: Arc<TxUpdateCoid>) -> Self {
        LogOneObjectInMemory {
            inner: RwLock::new(LooimInner {
                logentries: vec![SingleLogEntryInMemory::new_log(ts, tucoid, false)],
                pendingentries: Vec::new(),
                last_read: Ts::lowest(),
                next_pending_seq: 0,
            }),
        }
    }

    /// The highest timestamp ever observed by a read on this object.
    pub fn last_read(&self) -> Ts {
        self.inner.read().last_read
    }

    /// Number of retained log entries (for admin/status reporting).
    pub fn log_len(&self) -> usize {
        self.inner.read().logentries.len()
    }

    /// Reads a consistent snapshot as of `ts` (§4.4.2). Pass
    /// [`Ts::illegal`] for "the latest safe timestamp". `deferred`, if
    /// supplied, is registered as a waiter instead of failing when the read
    /// would observe uncommitted data.
    pub fn read(&self, ts: Ts, deferred: Option<Arc<dyn DeferredReader>>, cfg: &LogConfig) -> Result<ReadOutcome> {
        let mut inner = self.inner.write();

        let (read_ts, skip_pending_check) = if ts.is_illegal() {
            let pending_cutoff = inner.pendingentries.first().map(|p| p.sleim.ts).unwrap_or_else(Ts::highest);
            let count = inner.logentries.partition_point(|e| e.ts <= pending_cutoff);
            if count == 0 {
                return Err(Error::TooOldVersion);
            }
            (inner.logentries[count - 1].ts, true)
        } else {
            (ts, false)
        };

        if !skip_pending_check {
            if let Some(first_pending) = inner.pendingentries.first() {
                if first_pending.sleim.ts <= read_ts {
                    return match deferred {
                        Some(handle) => {
                            inner.pendingentries[0].sleim.add_waiter(handle, read_ts);
                            Ok(ReadOutcome::Deferred)
                        }
                        None => Err(Error::PendingData),
                    };
                }
            }
        }

        let count = inner.logentries.partition_point(|e| e.ts <= read_ts);
        if count == 0 {
            return Err(Error::TooOldVersion);
        }
        let newest_idx = count - 1;

        let checkpoint_idx = match inner.logentries[..=newest_idx].iter().rposition(|e| e.is_checkpoint()) {
            Some(idx) => idx,
            None => return Err(Error::TooOldVersion),
        };

        let is_value_checkpoint = matches!(
            inner.logentries[checkpoint_idx].tucoid.checkpoint(),
            Some(Checkpoint::Write(_))
        );

        let result_tucoid = if is_value_checkpoint {
            if checkpoint_idx != newest_idx {
                return Err(Error::CorruptedLog);
            }
            Arc::clone(&inner.logentries[checkpoint_idx].tucoid)
        } else {
            let base_sv = match inner.logentries[checkpoint_idx].tucoid.checkpoint() {
                Some(Checkpoint::WriteSv(sv)) => sv.clone(),
                _ => unreachable!("checkpoint_idx always points at a Write or WriteSV entry"),
            };

            let mut moveforward = 0usize;
            let mut moveforward_add = 0usize;
            let mut moveforward_del = 0usize;
            let mut materialized: Option<gaia_core::SuperValue> = None;
            let mut last_applied_ts = inner.logentries[checkpoint_idx].ts;

            for idx in (checkpoint_idx + 1)..=newest_idx {
                if inner.logentries[idx].tucoid.has_checkpoint() {
                    return Err(Error::CorruptedLog);
                }
                let sv = materialized.get_or_insert_with(|| base_sv.clone());
                inner.logentries[idx]
                    .tucoid
                    .apply_to(sv)
                    .map_err(|_| Error::CorruptedLog)?;
                for op in inner.logentries[idx].tucoid.list_items() {
                    match op {
                        gaia_pendingtx::ListOp::Add(..) => moveforward_add += 1,
                        gaia_pendingtx::ListOp::DelRange { .. } => moveforward_del += 1,
                    }
                }
                moveforward += 1;
                last_applied_ts = inner.logentries[idx].ts;
            }

            match materialized {
                None => Arc::clone(&inner.logentries[checkpoint_idx].tucoid),
                Some(sv) => {
                    let materialized_tucoid = Arc::new(TxUpdateCoid::from_checkpoint(Checkpoint::WriteSv(sv)));
                    if moveforward > cfg.min_items
                        || moveforward_add >= cfg.min_add_items
                        || moveforward_del >= cfg.min_delrange_items
                    {
                        inner.logentries[newest_idx] =
                            SingleLogEntryInMemory::new_snapshot(last_applied_ts, Arc::clone(&materialized_tucoid));
                    }
                    materialized_tucoid
                }
            }
        };

        if inner.last_read < read_ts {
            inner.last_read = read_ts;
        }
        gc_log_locked(&mut inner, read_ts, cfg);

        Ok(ReadOutcome::Found { tucoid: result_tucoid, read_ts })
    }

    /// Appends a committed entry (§4.4.3).
    pub fn write(&self, ts: Ts, tucoid: Arc<TxUpdateCoid>, single_version: bool, cfg: &LogConfig) {
        let mut inner = self.inner.write();
        let pos = inner.logentries.partition_point(|e| e.ts < ts);

        if is_single_idempotent_add(&tucoid) {
            if let Some(prev) = pos.checked_sub(1).map(|i| &inner.logentries[i]) {
                if prev.flags & sleim_flags::SNAPSHOT != 0 {
                    if let Some(Checkpoint::WriteSv(sv)) = prev.tucoid.checkpoint() {
                        if let Some(gaia_pendingtx::ListOp::Add(cell, _)) = tucoid.list_items().first() {
                            if sv.contains_key(&cell.key) {
                                return;
                            }
                        }
                    }
                }
            }
        }

        inner.logentries.insert(pos, SingleLogEntryInMemory::new_log(ts, tucoid, true));

        if single_version {
            if let Some(ckpt_idx) = inner.logentries.iter().rposition(|e| e.is_checkpoint()) {
                if ckpt_idx > 0 {
                    inner.logentries.drain(0..ckpt_idx);
                }
            }
        } else {
            gc_log_locked(&mut inner, ts, cfg);
        }
    }

    /// Inserts a prepared-but-uncommitted entry (§4.4.4).
    pub fn add_pending(&self, ts: Ts, tucoid: Arc<TxUpdateCoid>) -> PendingRef {
        let mut inner = self.inner.write();
        let seq = inner.next_pending_seq;
        inner.next_pending_seq += 1;
        let pos = inner.pendingentries.partition_point(|p| p.sleim.ts < ts);
        inner
            .pendingentries
            .insert(pos, PendingSlot { seq, sleim: SingleLogEntryInMemory::new_pending(ts, tucoid) });
        PendingRef(seq)
    }

    /// Resolves a prepared entry on commit (`move_to_log = true`) or abort
    /// (`move_to_log = false`), waking any deferred readers it unblocks
    /// (§4.4.5).
    pub fn remove_or_move_pending(&self, pending_ref: PendingRef, final_ts: Ts, move_to_log: bool, cfg: &LogConfig) {
        let mut inner = self.inner.write();
        let Some(idx) = inner.pendingentries.iter().position(|p| p.seq == pending_ref.0) else {
            return;
        };
        let removed = inner.pendingentries.remove(idx);

        if move_to_log {
            let pos = inner.logentries.partition_point(|e| e.ts < final_ts);
            inner.logentries.insert(pos, SingleLogEntryInMemory::new_log(final_ts, removed.sleim.tucoid, true));
        }

        for waiter in removed.sleim.waiters {
            let still_blocked = inner.pendingentries.iter().any(|p| p.sleim.ts <= waiter.threshold);
            if !still_blocked {
                waiter.handle.wake(final_ts);
            } else if let Some(target) = inner
                .pendingentries
                .iter_mut()
                .filter(|p| p.sleim.ts <= waiter.threshold)
                .min_by_key(|p| p.sleim.ts)
            {
                target.sleim.waiters.push(waiter);
            }
        }

        gc_log_locked(&mut inner, final_ts, cfg);
    }

    /// §4.8 Prepare step 3: advances `proposed_ts` past `last_read`
    /// (`addEpsilon`, if `last_read` would otherwise precede it), then
    /// checks `tucoid` against every committed log entry newer than
    /// `read_ts` (the transaction's own snapshot) and every currently
    /// pending entry, via [`has_conflicts`]. A conflict with either votes
    /// NO for the whole transaction. On success, records `last_read` as
    /// advanced (a prepare that inspects an object counts as touching it,
    /// same as a read) and returns the (possibly advanced) ts to propose.
    pub fn check_conflicts_and_advance(
        &self,
        tucoid: &TxUpdateCoid,
        read_ts: Ts,
        mut proposed_ts: Ts,
        policy: ConflictPolicy,
        rki: Option<&RcKeyInfo>,
    ) -> Result<Ts> {
        let mut inner = self.inner.write();
        if inner.last_read > proposed_ts {
            proposed_ts = inner.last_read;
            proposed_ts.add_epsilon();
        }

        for entry in inner.logentries.iter().filter(|e| e.ts > read_ts) {
            if has_conflicts(tucoid, &entry.tucoid, policy, rki) {
                return Err(Error::VoteNo);
            }
        }
        for pending in &inner.pendingentries {
            if has_conflicts(tucoid, &pending.sleim.tucoid, policy, rki) {
                return Err(Error::VoteNo);
            }
        }

        if inner.last_read < proposed_ts {
            inner.last_read = proposed_ts;
        }
        Ok(proposed_ts)
    }

    /// Discards entries subsumed by a checkpoint older than `reference_ts -
    /// stale_gc_ms` (§4.4.6). Returns the number of entries removed.
    pub fn gc_log(&self, reference_ts: Ts, cfg: &LogConfig) -> usize {
        let mut inner = self.inner.write();
        gc_log_locked(&mut inner, reference_ts, cfg)
    }
}

fn is_single_idempotent_add(tucoid: &TxUpdateCoid) -> bool {
    !tucoid.has_checkpoint() && tucoid.set_attrs_len() == 0 && tucoid.list_items().len() == 1
        && matches!(tucoid.list_items()[0], gaia_pendingtx::ListOp::Add(..))
}

fn gc_log_locked(inner: &mut LooimInner, reference_ts: Ts, cfg: &LogConfig) -> usize {
    let mut cutoff = reference_ts;
    cutoff.add_ms(-cfg.stale_gc_ms);

    let mut checkpoint_idx = None;
    for (i, e) in inner.logentries.iter().enumerate() {
        if e.ts >= cutoff {
            break;
        }
        if e.is_checkpoint() {
            checkpoint_idx = Some(i);
        }
    }

    match checkpoint_idx {
        Some(idx) if idx > 0 => {
            inner.logentries.drain(0..idx);
            trace!(removed = idx, "gc_log reclaimed stale log entries");
            idx
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaia_core::{CellKey, CellType, ListCell, SuperValue};

    fn value_tucoid(v: &[u8]) -> Arc<TxUpdateCoid> {
        Arc::new(TxUpdateCoid::from_checkpoint(Checkpoint::Write(v.to_vec())))
    }

    fn ts_at(us: u64) -> Ts {
        // Deterministic, collision-free timestamps at a known microsecond
        // offset from `Ts::lowest()`, independent of wall-clock time.
        let mut t = Ts::lowest();
        t.add_us(us as i64);
        t
    }

    #[test]
    fn scenario_1_single_writer_snapshot_read() {
        let looim = LogOneObjectInMemory::new_with_checkpoint(ts_at(1), value_tucoid(b"init"));
        let cfg = LogConfig::default();
        looim.write(ts_at(100), value_tucoid(b"a"), false, &cfg);
        looim.write(ts_at(200), value_tucoid(b"b"), false, &cfg);

        match looim.read(ts_at(150), None, &cfg).unwrap() {
            ReadOutcome::Found { tucoid, read_ts } => {
                assert_eq!(read_ts, ts_at(100));
                assert!(matches!(tucoid.checkpoint(), Some(Checkpoint::Write(v)) if v == b"a"));
            }
            _ => panic!("expected Found"),
        }

        match looim.read(ts_at(200), None, &cfg).unwrap() {
            ReadOutcome::Found { tucoid, read_ts } => {
                assert_eq!(read_ts, ts_at(200));
                assert!(matches!(tucoid.checkpoint(), Some(Checkpoint::Write(v)) if v == b"b"));
            }
            _ => panic!("expected Found"),
        }

        assert!(matches!(looim.read(ts_at(0), None, &cfg), Err(Error::TooOldVersion)));
    }

    #[test]
    fn scenario_2_delta_application() {
        let sv = SuperValue::new(2, CellType::IntKey);
        let looim = LogOneObjectInMemory::new_with_checkpoint(
            ts_at(1),
            Arc::new(TxUpdateCoid::from_checkpoint(Checkpoint::WriteSv(sv))),
        );
        let cfg = LogConfig::default();

        let mut raw1 = gaia_pendingtx::TxRawCoid::new();
        raw1.push(
            gaia_pendingtx::TxOp::Add { cell: ListCell { key: CellKey::Int(1), value: 7 }, prki: None },
            0,
        );
        looim.write(ts_at(110), raw1.compress(), false, &cfg);

        let mut raw2 = gaia_pendingtx::TxRawCoid::new();
        raw2.push(
            gaia_pendingtx::TxOp::Add { cell: ListCell { key: CellKey::Int(2), value: 8 }, prki: None },
            0,
        );
        looim.write(ts_at(120), raw2.compress(), false, &cfg);

        match looim.read(ts_at(130), None, &cfg).unwrap() {
            ReadOutcome::Found { tucoid, .. } => match tucoid.checkpoint() {
                Some(Checkpoint::WriteSv(sv)) => {
                    assert_eq!(sv.cells().len(), 2);
                    assert_eq!(sv.attrs, vec![0, 0]);
                }
                _ => panic!("expected a materialized supervalue checkpoint"),
            },
            _ => panic!("expected Found"),
        }
    }

    #[test]
    fn scenario_4_pending_blocks_read_then_deferred_wakeup() {
        let looim = LogOneObjectInMemory::new_with_checkpoint(ts_at(1), value_tucoid(b"init"));
        let cfg = LogConfig::default();

        let pending_ref = looim.add_pending(ts_at(200), value_tucoid(b"prepared"));

        assert!(matches!(looim.read(ts_at(250), None, &cfg), Err(Error::PendingData)));

        struct TestWaker(std::sync::Mutex<Option<Ts>>);
        impl DeferredReader for TestWaker {
            fn wake(&self, read_ts: Ts) {
                *self.0.lock().unwrap() = Some(read_ts);
            }
        }
        let waker = Arc::new(TestWaker(std::sync::Mutex::new(None)));
        let outcome = looim.read(ts_at(250), Some(waker.clone() as Arc<dyn DeferredReader>), &cfg).unwrap();
        assert!(matches!(outcome, ReadOutcome::Deferred));
        assert!(waker.0.lock().unwrap().is_none());

        looim.remove_or_move_pending(pending_ref, ts_at(210), true, &cfg);
        assert_eq!(*waker.0.lock().unwrap(), Some(ts_at(210)));

        match looim.read(ts_at(250), None, &cfg).unwrap() {
            ReadOutcome::Found { tucoid, .. } => {
                assert!(matches!(tucoid.checkpoint(), Some(Checkpoint::Write(v)) if v == b"prepared"));
            }
            _ => panic!("expected Found"),
        }
    }

    #[test]
    fn gc_retains_only_from_latest_stale_checkpoint() {
        let looim = LogOneObjectInMemory::new_with_checkpoint(ts_at(1), value_tucoid(b"v0"));
        let cfg = LogConfig { stale_gc_ms: 0, ..LogConfig::default() };
        looim.write(ts_at(2_000_000), value_tucoid(b"v1"), false, &cfg);
        looim.write(ts_at(4_000_000), value_tucoid(b"v2"), false, &cfg);
        // gc_log runs relative to microsecond timestamps; with stale_gc_ms=0
        // every checkpoint strictly before `now` is eligible, so only the
        // latest checkpoint survives once referenced from far enough ahead.
        let removed = looim.gc_log(ts_at(4_000_001), &cfg);
        assert!(removed >= 1);
        assert!(looim.log_len() >= 1);
    }

    #[test]
    fn prepare_conflict_check_votes_no_against_a_newer_committed_write() {
        let looim = LogOneObjectInMemory::new_with_checkpoint(ts_at(1), value_tucoid(b"init"));
        let cfg = LogConfig::default();
        looim.write(ts_at(100), value_tucoid(b"concurrent"), false, &cfg);

        let tucoid = value_tucoid(b"mine");
        let result = looim.check_conflicts_and_advance(&tucoid, ts_at(50), ts_at(110), gaia_pendingtx::ConflictPolicy::default(), None);
        assert!(matches!(result, Err(Error::VoteNo)));
    }

    #[test]
    fn prepare_conflict_check_succeeds_and_advances_past_last_read() {
        let looim = LogOneObjectInMemory::new_with_checkpoint(ts_at(1), value_tucoid(b"init"));
        let cfg = LogConfig::default();
        looim.read(ts_at(500), None, &cfg).unwrap(); // bumps last_read to 500

        let tucoid = value_tucoid(b"mine");
        let proposed = looim
            .check_conflicts_and_advance(&tucoid, ts_at(1), ts_at(100), gaia_pendingtx::ConflictPolicy::default(), None)
            .unwrap();
        assert!(proposed > ts_at(500));
    }
}
