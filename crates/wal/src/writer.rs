//! The WAL writer: a dedicated background thread draining a queue of
//! records, coalescing them into batched writes, and notifying callers once
//! their batch is durable (§4.6).
//!
//! Grounded in the teacher's `wal_writer.rs` (`Arc<Mutex<BufWriter<File>>>`
//! plus a background fsync thread keyed off a `DurabilityMode`), generalized
//! from "one writer thread fsyncs on a timer" to "one writer thread also
//! *drains the write queue itself*", which is what §4.6's
//! `logUpdatesAndYesVote(... notify_task)` async API requires: the caller
//! must not block on disk I/O, so the encode-then-enqueue step is separated
//! from the single thread that owns the file handle.
//!
//! Deliberate deviation from §4.6's literal disk I/O contract: the original
//! opens the WAL with `O_DIRECT` and manages a strictly page-aligned buffer,
//! rewinding the file offset to re-write a page's unused tail on the next
//! flush. `O_DIRECT` is a Linux-specific raw-I/O facility with no portable
//! std API, and the teacher's own `WalWriter` doesn't use it either — it
//! relies on a plain buffered `File` plus `fdatasync`/`sync_data` for
//! durability. This writer does the same: `page_size` governs how large a
//! batch is allowed to grow before it is forced out to the OS (a coalescing
//! knob, not a hardware-alignment requirement), and every flush writes
//! exactly the bytes buffered, no padding. Recorded in `DESIGN.md`.

use gaia_core::{Coid, Error, Result, Tid, Ts};
use gaia_pendingtx::TxUpdateCoid;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::config::{SyncPolicy, WalConfig};
use crate::record::WalRecord;

/// Receives the outcome of one enqueued batch once it has been flushed (and,
/// depending on [`SyncPolicy`], `fdatasync`'d). `Commit`/`Abort` are
/// fire-and-forget per §4.6 and never go through a sink.
pub trait WalCompletionSink: Send + Sync {
    /// Called exactly once, from the WAL thread, after the batch containing
    /// this sink's record(s) has been written (and synced, in `Strict`
    /// mode). `Err` carries the I/O or encoding failure that prevented
    /// durability; the caller's transaction must not proceed past prepare.
    fn notify(&self, result: std::result::Result<(), Arc<Error>>);
}

enum WalCommand {
    Write {
        records: Vec<WalRecord>,
        sink: Option<Arc<dyn WalCompletionSink>>,
    },
    Shutdown,
}

/// Handle to the background WAL thread. Cloning is not supported (there is
/// exactly one writer per WAL file); share a `WalWriter` behind an `Arc` to
/// use it from multiple caller threads, as `gaia-server`'s RPC workers do.
pub struct WalWriter {
    tx: mpsc::Sender<WalCommand>,
    handle: Option<JoinHandle<()>>,
}

impl WalWriter {
    /// Opens (creating if needed) the WAL file at `cfg.path` and spawns its
    /// dedicated writer thread.
    pub fn open(cfg: WalConfig) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).read(true).open(&cfg.path)?;
        let (tx, rx) = mpsc::channel::<WalCommand>();
        let handle = thread::Builder::new()
            .name("gaia-wal".into())
            .spawn(move || wal_thread(file, cfg, rx))
            .map_err(Error::Io)?;
        Ok(WalWriter { tx, handle: Some(handle) })
    }

    /// §4.6 `logUpdatesAndYesVote`: durably records the transaction's
    /// compressed per-COid effect (`MultiWrite`) followed by this node's
    /// `VoteYes`, as a single batch. Returns immediately; `sink` is notified
    /// from the WAL thread once both records are durable.
    pub fn log_updates_and_yes_vote(
        &self,
        tid: Tid,
        ts: Ts,
        coids: Vec<(Coid, Arc<TxUpdateCoid>)>,
        sink: Arc<dyn WalCompletionSink>,
    ) -> Result<()> {
        let records = vec![WalRecord::MultiWrite { tid, ts, coids }, WalRecord::VoteYes { tid }];
        self.enqueue(records, Some(sink))
    }

    /// §4.6 `Commit`: fire-and-forget, no completion notification.
    pub fn log_commit(&self, tid: Tid, ts: Ts) -> Result<()> {
        self.enqueue(vec![WalRecord::Commit { tid, ts }], None)
    }

    /// §4.6 `Abort`: fire-and-forget, no completion notification.
    pub fn log_abort(&self, tid: Tid, ts: Ts) -> Result<()> {
        self.enqueue(vec![WalRecord::Abort { tid, ts }], None)
    }

    fn enqueue(&self, records: Vec<WalRecord>, sink: Option<Arc<dyn WalCompletionSink>>) -> Result<()> {
        self.tx
            .send(WalCommand::Write { records, sink })
            .map_err(|_| Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "WAL thread has exited")))
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        let _ = self.tx.send(WalCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("WAL thread panicked during shutdown");
            }
        }
    }
}

fn wal_thread(mut file: File, cfg: WalConfig, rx: mpsc::Receiver<WalCommand>) {
    let mut buf: Vec<u8> = Vec::with_capacity(cfg.page_size);
    let writes_since_sync = AtomicU32::new(0);
    let mut last_sync = Instant::now();

    loop {
        let first = match rx.recv() {
            Ok(cmd) => cmd,
            Err(_) => break, // every WalWriter dropped
        };

        let mut pending_sinks: Vec<Arc<dyn WalCompletionSink>> = Vec::new();
        let mut shutting_down = false;
        let mut encode_err: Option<Error> = None;

        shutting_down |= apply_command(first, &mut buf, &mut pending_sinks, &mut encode_err);

        // Drain whatever else is already queued so one flush/fsync covers
        // as many records as arrived concurrently (group commit).
        while !shutting_down {
            match rx.try_recv() {
                Ok(cmd) => shutting_down |= apply_command(cmd, &mut buf, &mut pending_sinks, &mut encode_err),
                Err(_) => break,
            }
        }

        let flush_result = flush(&mut file, &mut buf)
            .and_then(|_| maybe_sync(&mut file, &cfg.sync_policy, &writes_since_sync, &mut last_sync));

        let outcome: std::result::Result<(), Arc<Error>> = match (flush_result, encode_err) {
            (Ok(()), None) => Ok(()),
            (Ok(()), Some(e)) => Err(Arc::new(e)),
            (Err(e), _) => Err(Arc::new(e)),
        };
        for sink in pending_sinks {
            sink.notify(clone_outcome(&outcome));
        }

        if shutting_down {
            let _ = flush(&mut file, &mut buf);
            let _ = file.sync_data();
            debug!("WAL thread shutting down");
            break;
        }
    }
}

/// Applies one queued command to the in-progress batch: encodes and buffers
/// a `Write`'s records (recording the first encode failure, if any, into
/// `encode_err`) or signals shutdown. Returns `true` for `Shutdown`.
fn apply_command(
    cmd: WalCommand,
    buf: &mut Vec<u8>,
    pending_sinks: &mut Vec<Arc<dyn WalCompletionSink>>,
    encode_err: &mut Option<Error>,
) -> bool {
    match cmd {
        WalCommand::Shutdown => true,
        WalCommand::Write { records, sink } => {
            for record in &records {
                match record.encode() {
                    Ok(bytes) => buf.extend_from_slice(&bytes),
                    Err(e) => {
                        warn!(error = %e, "failed to encode WAL record");
                        if encode_err.is_none() {
                            *encode_err = Some(e);
                        }
                    }
                }
            }
            if let Some(sink) = sink {
                pending_sinks.push(sink);
            }
            false
        }
    }
}

fn clone_outcome(outcome: &std::result::Result<(), Arc<Error>>) -> std::result::Result<(), Arc<Error>> {
    match outcome {
        Ok(()) => Ok(()),
        Err(e) => Err(Arc::clone(e)),
    }
}

fn flush(file: &mut File, buf: &mut Vec<u8>) -> Result<()> {
    if buf.is_empty() {
        return Ok(());
    }
    file.write_all(buf)?;
    buf.clear();
    Ok(())
}

fn maybe_sync(file: &mut File, policy: &SyncPolicy, writes_since_sync: &AtomicU32, last_sync: &mut Instant) -> Result<()> {
    let should_sync = match policy {
        SyncPolicy::Strict => true,
        SyncPolicy::Batched { max_writes, max_interval_ms } => {
            let n = writes_since_sync.fetch_add(1, Ordering::Relaxed) + 1;
            n >= *max_writes || last_sync.elapsed().as_millis() as u64 >= *max_interval_ms
        }
    };
    if should_sync {
        file.sync_data()?;
        writes_since_sync.store(0, Ordering::Relaxed);
        *last_sync = Instant::now();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::WalRecord;
    use gaia_pendingtx::{Checkpoint, TxUpdateCoid};
    use std::sync::Mutex;

    struct TestSink(Mutex<Option<std::result::Result<(), Arc<Error>>>>);
    impl TestSink {
        fn new() -> Arc<Self> {
            Arc::new(TestSink(Mutex::new(None)))
        }
    }
    impl WalCompletionSink for TestSink {
        fn notify(&self, result: std::result::Result<(), Arc<Error>>) {
            *self.0.lock().unwrap() = Some(result);
        }
    }

    #[test]
    fn log_updates_and_yes_vote_notifies_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = WalConfig::new(dir.path().join("wal.log"));
        let writer = WalWriter::open(cfg.clone()).unwrap();
        let tid = Tid::new();
        let ts = Ts::new();
        let tucoid = Arc::new(TxUpdateCoid::from_checkpoint(Checkpoint::Write(b"x".to_vec())));
        let sink = TestSink::new();
        writer
            .log_updates_and_yes_vote(tid, ts, vec![(Coid::new(1, 1), tucoid)], sink.clone())
            .unwrap();
        writer.log_commit(tid, ts).unwrap();
        drop(writer);

        assert!(matches!(*sink.0.lock().unwrap(), Some(Ok(()))));

        let bytes = std::fs::read(&cfg.path).unwrap();
        let mut offset = 0;
        let mut kinds = vec![];
        while offset < bytes.len() {
            let (rec, consumed) = WalRecord::decode(&bytes[offset..]).unwrap().unwrap();
            kinds.push(rec.kind());
            offset += consumed;
        }
        assert_eq!(kinds.len(), 3);
    }

    #[test]
    fn batched_policy_defers_sync_but_still_persists_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = WalConfig::new(dir.path().join("wal.log"));
        cfg.sync_policy = SyncPolicy::Batched { max_writes: 1000, max_interval_ms: 60_000 };
        let writer = WalWriter::open(cfg.clone()).unwrap();
        writer.log_commit(Tid::new(), Ts::new()).unwrap();
        drop(writer); // shutdown path flushes + syncs unconditionally
        let bytes = std::fs::read(&cfg.path).unwrap();
        assert!(!bytes.is_empty());
    }
}
