//! The 2PC participant engine (C10, §4.8): wires `gaia-pendingtx`,
//! `gaia-logmem`, `gaia-wal`, and `gaia-splitter` together into the
//! per-RPC operations `handlers.rs` exposes over `gaia-net`.
//!
//! Grounded in the teacher's `concurrency` crate for the "one struct owns
//! every shared table, methods take `&self` and lock internally" shape,
//! generalized from lock-free counters to this engine's richer per-COid
//! and per-tid state.

use dashmap::DashMap;
use gaia_core::{Coid, Error, Result, Tid, Ts};
use gaia_logmem::{DeferredReader, LogConfig, LogInMemory, PendingRef, ReadOutcome};
use gaia_pendingtx::{Checkpoint, ConflictPolicy, PendingTx, TxOp, TxStatus, TxUpdateCoid};
use gaia_splitter::{throttle_delay, LoadStats, SplitQueue};
use gaia_wal::{WalCompletionSink, WalWriter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::wire::*;

/// §9 Open Question / Decision #1: an idle deferred reader has no timeout
/// in the original. We add one — a client that vanished mid-read should
/// not pin a waiter on a COid forever. See `DESIGN.md`.
const DEFAULT_DEFERRED_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Heavy-hitter threshold (§4.7) below which a COid's access count is not
/// even considered for a split.
const DEFAULT_HEAVY_HITTER_THRESHOLD: u64 = 1000;

struct BlockingWal {
    pair: Arc<(Mutex<Option<std::result::Result<(), Arc<Error>>>>, Condvar)>,
}

impl BlockingWal {
    fn new() -> Self {
        BlockingWal { pair: Arc::new((Mutex::new(None), Condvar::new())) }
    }

    fn wait(&self) -> std::result::Result<(), Arc<Error>> {
        let (lock, cvar) = &*self.pair;
        let mut guard = lock.lock().unwrap();
        while guard.is_none() {
            guard = cvar.wait(guard).unwrap();
        }
        guard.take().unwrap()
    }
}

impl WalCompletionSink for BlockingWal {
    fn notify(&self, result: std::result::Result<(), Arc<Error>>) {
        let (lock, cvar) = &*self.pair;
        *lock.lock().unwrap() = Some(result);
        cvar.notify_one();
    }
}

/// Blocks the calling (blocking-pool) thread until a commit/abort wakes it,
/// or until `timeout` elapses (Decision #1).
struct BlockingDeferredReader {
    pair: Arc<(Mutex<Option<Ts>>, Condvar)>,
}

impl BlockingDeferredReader {
    fn new() -> Self {
        BlockingDeferredReader { pair: Arc::new((Mutex::new(None), Condvar::new())) }
    }

    fn wait(&self, timeout: Duration) -> Option<Ts> {
        let (lock, cvar) = &*self.pair;
        let guard = lock.lock().unwrap();
        let (guard, result) = cvar.wait_timeout_while(guard, timeout, |ts| ts.is_none()).unwrap();
        if result.timed_out() {
            None
        } else {
            *guard
        }
    }
}

impl DeferredReader for BlockingDeferredReader {
    fn wake(&self, read_ts: Ts) {
        let (lock, cvar) = &*self.pair;
        *lock.lock().unwrap() = Some(read_ts);
        cvar.notify_one();
    }
}

/// Per-tid bookkeeping the engine needs beyond what `PendingTxInfo` tracks:
/// the `PendingRef` handed back by each touched COid's `add_pending` at
/// YES-vote time (§4.8 step 4 "store the returned SLEIM-ref back..."),
/// kept here rather than inside `gaia-pendingtx::PendingTxInfo` since
/// `PendingRef` is a `gaia-logmem` type and `gaia-pendingtx` must not
/// depend on its own downstream consumer.
type PendingRefs = Vec<(Coid, PendingRef)>;

/// Owns every shared table and drives the §4.8 RPC handlers.
pub struct Engine {
    log: LogInMemory,
    log_config: LogConfig,
    pending: PendingTx,
    pending_refs: DashMap<Tid, PendingRefs>,
    wal: Arc<WalWriter>,
    conflict_policy: ConflictPolicy,
    load_stats: LoadStats,
    split_queue: Mutex<SplitQueue>,
    deferred_read_timeout: Duration,
    splitter_enabled: AtomicBool,
    shutdown_requested: AtomicBool,
}

impl Engine {
    /// Builds an engine over an already-opened log table and WAL writer.
    pub fn new(log: LogInMemory, wal: WalWriter) -> Self {
        Engine {
            log,
            log_config: LogConfig::default(),
            pending: PendingTx::new(),
            pending_refs: DashMap::new(),
            wal: Arc::new(wal),
            conflict_policy: ConflictPolicy::default(),
            load_stats: LoadStats::new(DEFAULT_HEAVY_HITTER_THRESHOLD),
            split_queue: Mutex::new(SplitQueue::new()),
            deferred_read_timeout: DEFAULT_DEFERRED_READ_TIMEOUT,
            splitter_enabled: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    /// Read-only access to the resident-object table, for admin reporting.
    pub fn log(&self) -> &LogInMemory {
        &self.log
    }

    /// Read-only access to recorded load stats, for the splitter thread.
    pub fn load_stats(&self) -> &LoadStats {
        &self.load_stats
    }

    /// True once `Shutdown` has been requested.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    // -- RPC #1 --------------------------------------------------------

    /// `GetStatus` (§2 supplemented feature).
    pub fn status(&self) -> StatusResp {
        StatusResp {
            resident_coids: self.log.len(),
            pending_txs: self.pending.len(),
            split_queue_depth: self.split_queue.lock().unwrap().len(),
            wal_alive: true,
        }
    }

    // -- Buffering RPCs (#2, #4, #6, #7, #8) ----------------------------

    /// RPC #2 `Write`: buffers a whole-value overwrite into the
    /// transaction's raw op list for `coid` (Init/Buffered -> Buffered).
    pub fn write(&self, req: WriteReq) -> Result<()> {
        let (info, _) = self.pending.get_info(req.tid);
        info.lock().unwrap().raw_coid_mut(req.coid).push(TxOp::Write(req.value), req.level);
        Ok(())
    }

    /// RPC #4 `FullWrite`.
    pub fn full_write(&self, req: FullWriteReq) -> Result<()> {
        let (info, _) = self.pending.get_info(req.tid);
        info.lock().unwrap().raw_coid_mut(req.coid).push(TxOp::WriteSv(req.sv), req.level);
        Ok(())
    }

    /// RPC #6 `ListAdd`.
    pub fn list_add(&self, req: ListAddReq) -> Result<()> {
        self.load_stats.report(req.coid, req.cell.key.clone());
        let (info, _) = self.pending.get_info(req.tid);
        info.lock().unwrap().raw_coid_mut(req.coid).push(
            TxOp::Add { cell: req.cell, prki: req.prki },
            req.level,
        );
        Ok(())
    }

    /// RPC #7 `ListDelRange`.
    pub fn list_del_range(&self, req: ListDelRangeReq) -> Result<()> {
        let interval = req.interval()?;
        let (info, _) = self.pending.get_info(req.tid);
        info.lock().unwrap().raw_coid_mut(req.coid).push(
            TxOp::DelRange { start: req.start, end: req.end, interval },
            req.level,
        );
        Ok(())
    }

    /// RPC #8 `AttrSet`.
    pub fn attr_set(&self, req: AttrSetReq) -> Result<()> {
        let (info, _) = self.pending.get_info(req.tid);
        info.lock().unwrap().raw_coid_mut(req.coid).push(
            TxOp::AttrSet { attr_id: req.attr_id, value: req.value },
            req.level,
        );
        Ok(())
    }

    // -- Read RPCs (#3, #5) ---------------------------------------------

    /// RPC #3 `Read` (and the shared implementation for #5 `FullRead`'s
    /// snapshot lookup): records the read in the transaction's read set
    /// (if `tid` is supplied) and resolves it against the log, blocking
    /// this (blocking-pool) thread to emulate the §5 task-suspension model
    /// when the read is deferred.
    pub fn read(&self, req: ReadReq) -> Result<ReadResp> {
        self.load_stats.report(req.coid, gaia_core::CellKey::Int(0));
        let looim = self
            .log
            .get_and_lock(req.coid, true)?
            .expect("get_and_lock(create_first=true) always returns Some");

        let outcome = self.resolve_read(&looim, req.ts, req.allow_defer)?;
        match outcome.checkpoint() {
            Some(Checkpoint::Write(v)) => Ok(ReadResp { read_ts: outcome.read_ts, value: v.clone() }),
            Some(Checkpoint::WriteSv(_)) => Err(Error::WrongType { expected: "Value", actual: "SuperValue" }),
            None => Err(Error::CorruptedLog),
        }
    }

    /// RPC #5 `FullRead`.
    pub fn full_read(&self, req: FullReadReq) -> Result<FullReadResp> {
        self.load_stats.report(req.coid, gaia_core::CellKey::Int(0));
        let looim = self
            .log
            .get_and_lock(req.coid, true)?
            .expect("get_and_lock(create_first=true) always returns Some");

        let outcome = self.resolve_read(&looim, req.ts, req.allow_defer)?;
        match outcome.checkpoint() {
            Some(Checkpoint::WriteSv(sv)) => Ok(FullReadResp { read_ts: outcome.read_ts, sv: sv.clone() }),
            Some(Checkpoint::Write(_)) => Err(Error::WrongType { expected: "SuperValue", actual: "Value" }),
            None => Err(Error::CorruptedLog),
        }
    }

    fn resolve_read(
        &self,
        looim: &gaia_logmem::LogOneObjectInMemory,
        ts: Ts,
        allow_defer: bool,
    ) -> Result<Resolved> {
        let deferred: Option<Arc<dyn DeferredReader>> =
            if allow_defer { Some(Arc::new(BlockingDeferredReader::new()) as Arc<dyn DeferredReader>) } else { None };

        match looim.read(ts, deferred.clone(), &self.log_config)? {
            ReadOutcome::Found { tucoid, read_ts } => Ok(Resolved { tucoid, read_ts }),
            ReadOutcome::Deferred => {
                // Safety: `deferred` is `Some` whenever `ReadOutcome::Deferred`
                // can be returned (see `LogOneObjectInMemory::read`).
                let waiter = deferred.unwrap();
                let blocking = waiter_as_blocking(&waiter);
                let woken_ts = blocking.wait(self.deferred_read_timeout);
                let read_ts = woken_ts.ok_or(Error::PendingData)?;
                match looim.read(read_ts, None, &self.log_config)? {
                    ReadOutcome::Found { tucoid, read_ts } => Ok(Resolved { tucoid, read_ts }),
                    ReadOutcome::Deferred => Err(Error::PendingData),
                }
            }
        }
    }

    // -- 2PC RPCs (#9, #10, #11) -----------------------------------------

    /// RPC #9 `Prepare` (§4.8 core algorithm).
    pub fn prepare(&self, req: PrepareReq) -> Result<PrepareResp> {
        let (info, _) = self.pending.get_info(req.tid);
        let touched: Vec<Coid> = {
            let guard = info.lock().unwrap();
            guard.coids().copied().collect()
        };

        let mut proposed_ts = req.proposed_ts;
        let mut tucoids: Vec<(Coid, Arc<TxUpdateCoid>)> = Vec::with_capacity(touched.len());

        for coid in &touched {
            let tucoid = {
                let mut guard = info.lock().unwrap();
                guard.raw_coid_mut(*coid).compress()
            };
            tucoids.push((*coid, tucoid));
        }

        for (coid, tucoid) in &tucoids {
            let looim = self
                .log
                .get_and_lock(*coid, true)?
                .expect("get_and_lock(create_first=true) always returns Some");
            match looim.check_conflicts_and_advance(tucoid, req.read_ts, proposed_ts, self.conflict_policy, None) {
                Ok(advanced) => {
                    if advanced > proposed_ts {
                        proposed_ts = advanced;
                    }
                }
                Err(Error::VoteNo) => {
                    info.lock().unwrap().status = TxStatus::VotedNo;
                    return Ok(PrepareResp { vote: false, final_ts: req.proposed_ts });
                }
                Err(e) => return Err(e),
            }
        }

        let write_set: Vec<(Coid, Arc<TxUpdateCoid>)> = tucoids
            .into_iter()
            .filter(|(_, t)| t.has_checkpoint() || t.set_attrs_len() > 0 || !t.list_items().is_empty())
            .collect();

        let mut refs: PendingRefs = Vec::with_capacity(write_set.len());
        for (coid, tucoid) in &write_set {
            let looim = self.log.get_and_lock(*coid, true)?.expect("resident by construction above");
            refs.push((*coid, looim.add_pending(proposed_ts, Arc::clone(tucoid))));
        }
        self.pending_refs.insert(req.tid, refs);

        let sink = Arc::new(BlockingWal::new());
        self.wal.log_updates_and_yes_vote(req.tid, proposed_ts, write_set, sink.clone())?;
        if let Err(e) = sink.wait() {
            error!(tid = %req.tid, error = %e, "WAL failed to persist a YES vote, durability is non-negotiable");
            // §7: "flush errors abort the process". This node cannot safely
            // continue participating in 2PC once its own WAL is unreliable.
            std::process::abort();
        }

        info.lock().unwrap().status = TxStatus::VotedYes;
        info!(tid = %req.tid, ts = %proposed_ts, "voted YES");
        Ok(PrepareResp { vote: true, final_ts: proposed_ts })
    }

    /// RPC #10 `Commit` (and its abort path, §4.8).
    pub fn commit(&self, req: CommitReq) -> Result<()> {
        let refs = self.pending_refs.remove(&req.tid).map(|(_, v)| v).unwrap_or_default();

        match req.outcome {
            CommitOutcome::Commit(final_ts) => {
                for (coid, pending_ref) in refs {
                    if let Some(looim) = self.log.get_and_lock(coid, false)? {
                        looim.remove_or_move_pending(pending_ref, final_ts, true, &self.log_config);
                    }
                }
                self.wal.log_commit(req.tid, final_ts)?;
                info!(tid = %req.tid, ts = %final_ts, "committed");
            }
            CommitOutcome::Abort => {
                for (coid, pending_ref) in refs {
                    if let Some(looim) = self.log.get_and_lock(coid, false)? {
                        looim.remove_or_move_pending(pending_ref, Ts::new(), false, &self.log_config);
                    }
                }
                self.wal.log_abort(req.tid, Ts::new())?;
                warn!(tid = %req.tid, "aborted");
            }
        }

        self.pending.remove_info(&req.tid);
        Ok(())
    }

    /// RPC #11 `Subtrans`.
    pub fn subtrans(&self, req: SubtransReq) -> Result<()> {
        let (info, _) = self.pending.get_info(req.tid);
        let mut guard = info.lock().unwrap();
        if let Some(level) = req.abort_level {
            guard.abort_level(level);
        }
        if let Some(level) = req.release_level {
            guard.release_level(level);
        }
        Ok(())
    }

    // -- Admin RPCs (#12-15) ----------------------------------------------

    /// RPC #12 `Shutdown`.
    pub fn shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    /// RPC #13 `StartSplitter`.
    pub fn start_splitter(&self) {
        self.splitter_enabled.store(true, Ordering::SeqCst);
    }

    /// True once `StartSplitter` has been requested.
    pub fn splitter_enabled(&self) -> bool {
        self.splitter_enabled.load(Ordering::SeqCst)
    }

    /// RPC #14 `FlushFile` / admin `save_individual`: materializes `coid`'s
    /// latest snapshot and writes it as the sole on-disk checkpoint.
    pub fn flush_file(&self, coid: Coid) -> Result<()> {
        let looim = self.log.get_and_lock(coid, true)?.expect("get_and_lock(create_first=true) always returns Some");
        match looim.read(Ts::illegal(), None, &self.log_config)? {
            ReadOutcome::Found { tucoid, .. } => self.log.disk().write_coid(coid, &tucoid),
            ReadOutcome::Deferred => unreachable!("Ts::illegal() reads never defer"),
        }
    }

    /// RPC #15 `LoadFile` / admin `load_individual`: evicts `coid` from
    /// memory so the next access reloads it from disk.
    pub fn load_file(&self, coid: Coid) -> Result<()> {
        self.log.evict(coid);
        Ok(())
    }

    /// Admin `save filename` (§6.6, §4.4.8 `flush_to_file`): snapshots
    /// every resident COid at a fresh timestamp into one file, distinct
    /// from the per-COid `save_individual`/[`Self::flush_file`].
    pub fn save_to_file(&self, filename: &std::path::Path) -> Result<()> {
        self.log.flush_to_file(Ts::new(), filename, &self.log_config)
    }

    /// Admin `load filename` (§6.6, §4.4.8 `load_from_file`): installs
    /// every COid recorded in `filename` as that COid's latest checkpoint.
    /// Returns the number of COids loaded.
    pub fn load_from_file(&self, filename: &std::path::Path) -> Result<usize> {
        self.log.load_from_file(filename, &self.log_config)
    }

    /// RPC #16 `GetRowid`.
    pub fn get_rowid(&self, cid: u64) -> Result<i64> {
        self.log.disk().rowid_allocator(cid).next()
    }

    // -- Splitter integration (C9) ----------------------------------------

    /// Scans load stats for heavy hitters and enqueues split requests for
    /// any not already pending (§4.7 `check`). Intended to be called once
    /// per `StatIntervalMs` from a dedicated splitter thread.
    pub fn run_splitter_check(&self) {
        if !self.splitter_enabled.load(Ordering::SeqCst) {
            return;
        }
        let now = std::time::Instant::now();
        let mut queue = self.split_queue.lock().unwrap();
        for candidate in self.load_stats.check() {
            queue.request(candidate.coid, candidate.split_cell, now);
        }
    }

    /// Pops and "dispatches" (logs; the splitter's actual decision logic
    /// is an external collaborator — see §1 Non-goals) the next pending
    /// split request, returning the throttle delay to wait before the
    /// next dispatch attempt.
    pub fn dispatch_next_split(&self) -> Option<Duration> {
        let mut queue = self.split_queue.lock().unwrap();
        let pending = queue.pop()?;
        let depth = queue.len();
        drop(queue);

        let node_size = self.log.len() as u64 * 4096;
        info!(coid = %pending.coid, retry = pending.retry_count, "dispatching split request");
        self.load_stats.clear(pending.coid);
        Some(throttle_delay(depth, pending.retry_count, node_size))
    }
}

struct Resolved {
    tucoid: Arc<TxUpdateCoid>,
    read_ts: Ts,
}

impl Resolved {
    fn checkpoint(&self) -> Option<&Checkpoint> {
        self.tucoid.checkpoint()
    }
}

fn waiter_as_blocking(waiter: &Arc<dyn DeferredReader>) -> &BlockingDeferredReader {
    // `resolve_read` only ever constructs `BlockingDeferredReader`s, so this
    // downcast-by-construction is always valid; there is exactly one
    // `DeferredReader` implementation in this binary.
    let ptr: *const dyn DeferredReader = Arc::as_ptr(waiter);
    unsafe { &*(ptr as *const BlockingDeferredReader) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaia_core::{CellKey, CellType, ListCell, SuperValue};
    use gaia_logmem::DiskStorage;
    use gaia_wal::WalConfig;

    fn engine(dir: &tempfile::TempDir) -> Engine {
        let log = LogInMemory::new(DiskStorage::open(dir.path().join("store")).unwrap());
        let wal = WalWriter::open(WalConfig::new(dir.path().join("wal.log"))).unwrap();
        Engine::new(log, wal)
    }

    #[test]
    fn write_then_prepare_then_commit_round_trips_a_value() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let tid = Tid::new();
        let coid = Coid::new(1, 1);

        engine.write(WriteReq { tid, coid, level: 0, value: b"hello".to_vec() }).unwrap();

        let prepare = engine
            .prepare(PrepareReq { tid, read_ts: Ts::lowest(), proposed_ts: Ts::new() })
            .unwrap();
        assert!(prepare.vote);

        engine.commit(CommitReq { tid, outcome: CommitOutcome::Commit(prepare.final_ts) }).unwrap();

        let read = engine
            .read(ReadReq { coid, ts: Ts::illegal(), allow_defer: false })
            .unwrap();
        assert_eq!(read.value, b"hello");
    }

    #[test]
    fn conflicting_writers_vote_no() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let coid = Coid::new(1, 2);

        let tid_a = Tid::new();
        engine.write(WriteReq { tid: tid_a, coid, level: 0, value: b"a".to_vec() }).unwrap();
        let read_ts = Ts::lowest();
        let prepare_a = engine.prepare(PrepareReq { tid: tid_a, read_ts, proposed_ts: Ts::new() }).unwrap();
        assert!(prepare_a.vote);

        let tid_b = Tid::new();
        engine.write(WriteReq { tid: tid_b, coid, level: 0, value: b"b".to_vec() }).unwrap();
        let prepare_b = engine.prepare(PrepareReq { tid: tid_b, read_ts, proposed_ts: Ts::new() }).unwrap();
        assert!(!prepare_b.vote);
    }

    #[test]
    fn full_write_and_full_read_round_trip_a_supervalue() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let tid = Tid::new();
        let coid = Coid::new(2, 1);

        let mut sv = SuperValue::new(1, CellType::IntKey);
        sv.set_attr(0, 7).unwrap();
        engine.full_write(FullWriteReq { tid, coid, level: 0, sv }).unwrap();
        let prepare = engine.prepare(PrepareReq { tid, read_ts: Ts::lowest(), proposed_ts: Ts::new() }).unwrap();
        engine.commit(CommitReq { tid, outcome: CommitOutcome::Commit(prepare.final_ts) }).unwrap();

        let read = engine.full_read(FullReadReq { coid, ts: Ts::illegal(), allow_defer: false }).unwrap();
        assert_eq!(read.sv.attrs[0], 7);
    }

    #[test]
    fn list_add_then_prepare_inserts_a_cell() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let tid = Tid::new();
        let coid = Coid::new(3, 1);

        engine
            .full_write(FullWriteReq { tid, coid, level: 0, sv: SuperValue::new(0, CellType::IntKey) })
            .unwrap();
        let p1 = engine.prepare(PrepareReq { tid, read_ts: Ts::lowest(), proposed_ts: Ts::new() }).unwrap();
        engine.commit(CommitReq { tid, outcome: CommitOutcome::Commit(p1.final_ts) }).unwrap();

        let tid2 = Tid::new();
        engine
            .list_add(ListAddReq { tid: tid2, coid, level: 0, cell: ListCell { key: CellKey::Int(9), value: 1 }, prki: None })
            .unwrap();
        let p2 = engine.prepare(PrepareReq { tid: tid2, read_ts: p1.final_ts, proposed_ts: Ts::new() }).unwrap();
        assert!(p2.vote);
        engine.commit(CommitReq { tid: tid2, outcome: CommitOutcome::Commit(p2.final_ts) }).unwrap();

        let read = engine.full_read(FullReadReq { coid, ts: Ts::illegal(), allow_defer: false }).unwrap();
        assert_eq!(read.sv.cells().len(), 1);
    }

    #[test]
    fn abort_clears_pending_entry_without_committing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let tid = Tid::new();
        let coid = Coid::new(4, 1);

        engine.write(WriteReq { tid, coid, level: 0, value: b"x".to_vec() }).unwrap();
        let prepare = engine.prepare(PrepareReq { tid, read_ts: Ts::lowest(), proposed_ts: Ts::new() }).unwrap();
        assert!(prepare.vote);
        engine.commit(CommitReq { tid, outcome: CommitOutcome::Abort }).unwrap();

        let read = engine.read(ReadReq { coid, ts: Ts::illegal(), allow_defer: false }).unwrap();
        assert_eq!(read.value, Vec::<u8>::new());
    }

    #[test]
    fn flush_then_load_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let tid = Tid::new();
        let coid = Coid::new(5, 1);

        engine.write(WriteReq { tid, coid, level: 0, value: b"persisted".to_vec() }).unwrap();
        let prepare = engine.prepare(PrepareReq { tid, read_ts: Ts::lowest(), proposed_ts: Ts::new() }).unwrap();
        engine.commit(CommitReq { tid, outcome: CommitOutcome::Commit(prepare.final_ts) }).unwrap();

        engine.flush_file(coid).unwrap();
        engine.load_file(coid).unwrap();

        let read = engine.read(ReadReq { coid, ts: Ts::illegal(), allow_defer: false }).unwrap();
        assert_eq!(read.value, b"persisted");
    }

    #[test]
    fn save_to_file_then_load_from_file_restores_a_committed_write() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        let tid = Tid::new();
        let coid = Coid::new(6, 1);

        engine.write(WriteReq { tid, coid, level: 0, value: b"whole-table-snapshot".to_vec() }).unwrap();
        let prepare = engine.prepare(PrepareReq { tid, read_ts: Ts::lowest(), proposed_ts: Ts::new() }).unwrap();
        engine.commit(CommitReq { tid, outcome: CommitOutcome::Commit(prepare.final_ts) }).unwrap();

        let snapshot = dir.path().join("snapshot.gaia");
        engine.save_to_file(&snapshot).unwrap();

        let other_dir = tempfile::tempdir().unwrap();
        let other = engine(&other_dir);
        let loaded = other.load_from_file(&snapshot).unwrap();
        assert_eq!(loaded, 1);

        let read = other.read(ReadReq { coid, ts: Ts::illegal(), allow_defer: false }).unwrap();
        assert_eq!(read.value, b"whole-table-snapshot");
    }

    #[test]
    fn get_rowid_is_monotonically_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        assert_eq!(engine.get_rowid(7).unwrap(), 1);
        assert_eq!(engine.get_rowid(7).unwrap(), 2);
    }
}
