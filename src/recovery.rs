//! Startup WAL replay (§4.4.8, §4.6, spec.md §1 non-goal "crash consistency
//! beyond WAL-replay of committed transactions").
//!
//! Only committed transactions are replayed into the in-memory log. A
//! transaction that durably voted YES but has neither a `Commit` nor an
//! `Abort` record is, by spec.md's own non-goal, outside this node's
//! authority to resolve on its own — an external 2PC coordinator decided
//! its fate and that decision did not reach this WAL before the crash.
//! Dropping it here matches the original's behavior (`disklog.cpp`'s
//! replay only ever calls `write()` for committed effects); a production
//! deployment resumes such a transaction by asking the coordinator, which
//! is out of scope per spec.md §1.

use gaia_logmem::LogConfig;
use gaia_wal::{group_by_tid, read_all};
use tracing::{info, warn};

use crate::engine::Engine;

/// Replays every committed transaction found in the WAL at `wal_path` into
/// `engine`'s in-memory log. Called once at startup, before the RPC
/// listener binds.
pub fn replay_committed(engine: &Engine, wal_path: &std::path::Path) -> gaia_core::Result<()> {
    let records = read_all(wal_path)?;
    let by_tid = group_by_tid(records);

    let mut replayed = 0usize;
    let mut dropped_in_flight = 0usize;
    let log_config = LogConfig::default();

    for (tid, recovered) in by_tid {
        match (recovered.committed, &recovered.multiwrite) {
            (Some(ts), Some((_, coids))) => {
                for (coid, tucoid) in coids {
                    if let Some(looim) = engine.log().get_and_lock(*coid, true)? {
                        looim.write(ts, std::sync::Arc::clone(tucoid), engine.log().single_version(), &log_config);
                    }
                }
                replayed += 1;
            }
            (None, _) if recovered.voted_yes && !recovered.aborted => {
                warn!(%tid, "dropping in-flight (voted-yes, unresolved) transaction found at WAL replay");
                dropped_in_flight += 1;
            }
            _ => {}
        }
    }

    info!(replayed, dropped_in_flight, "WAL replay complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaia_core::{Coid, Tid, Ts};
    use gaia_logmem::{DiskStorage, LogInMemory, ReadOutcome};
    use gaia_pendingtx::{Checkpoint, TxUpdateCoid};
    use gaia_wal::{WalConfig, WalWriter};
    use std::sync::Arc;

    struct NullSink;
    impl gaia_wal::WalCompletionSink for NullSink {
        fn notify(&self, _result: std::result::Result<(), Arc<gaia_core::Error>>) {}
    }

    fn engine(dir: &tempfile::TempDir) -> Engine {
        let log = LogInMemory::new(DiskStorage::open(dir.path().join("store")).unwrap());
        let wal = WalWriter::open(WalConfig::new(dir.path().join("replay-wal.log"))).unwrap();
        Engine::new(log, wal)
    }

    #[test]
    fn replay_restores_a_committed_write_but_drops_an_in_flight_one() {
        let dir = tempfile::tempdir().unwrap();
        let wal_path = dir.path().join("source-wal.log");
        let committed_coid = Coid::new(1, 1);
        let in_flight_coid = Coid::new(2, 2);
        {
            let writer = WalWriter::open(WalConfig::new(&wal_path)).unwrap();
            let committed_tid = Tid::new();
            let ts = Ts::new();
            writer
                .log_updates_and_yes_vote(
                    committed_tid,
                    ts,
                    vec![(committed_coid, Arc::new(TxUpdateCoid::from_checkpoint(Checkpoint::Write(b"ok".to_vec()))))],
                    Arc::new(NullSink),
                )
                .unwrap();
            writer.log_commit(committed_tid, ts).unwrap();

            let in_flight_tid = Tid::new();
            writer
                .log_updates_and_yes_vote(
                    in_flight_tid,
                    Ts::new(),
                    vec![(in_flight_coid, Arc::new(TxUpdateCoid::from_checkpoint(Checkpoint::Write(b"stuck".to_vec()))))],
                    Arc::new(NullSink),
                )
                .unwrap();
        }

        let engine = engine(&dir);
        replay_committed(&engine, &wal_path).unwrap();

        let looim = engine.log().get_and_lock(committed_coid, true).unwrap().unwrap();
        match looim.read(Ts::illegal(), None, &LogConfig::default()).unwrap() {
            ReadOutcome::Found { tucoid, .. } => {
                assert!(matches!(tucoid.checkpoint(), Some(Checkpoint::Write(v)) if v == b"ok"));
            }
            _ => panic!("expected Found"),
        }

        let looim = engine.log().get_and_lock(in_flight_coid, true).unwrap().unwrap();
        match looim.read(Ts::illegal(), None, &LogConfig::default()).unwrap() {
            ReadOutcome::Found { tucoid, .. } => {
                assert!(matches!(tucoid.checkpoint(), Some(Checkpoint::Write(v)) if v.is_empty()));
            }
            _ => panic!("expected Found"),
        }
    }

    #[test]
    fn replay_of_a_nonexistent_wal_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        replay_committed(&engine, &dir.path().join("missing.log")).unwrap();
        assert_eq!(engine.log().len(), 0);
    }
}
