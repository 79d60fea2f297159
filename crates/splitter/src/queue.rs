//! Split request dedup queue and throttle (§4.7 "deduplicated by coid...
//! retries are coalesced; a throttle derives a request delay from {queue
//! depth, time spent retrying, node size}").
//!
//! Grounded in the original's `splitterclient.cpp` pending-request table
//! plus `gaia-wal`'s `SyncPolicy::Batched` for the precedent of deriving a
//! delay from observed load rather than a fixed sleep.

use gaia_core::{CellKey, Coid};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One deduplicated split request, tracking how long it has been retried
/// so the throttle can back off requests that keep failing.
#[derive(Debug, Clone)]
pub struct PendingSplit {
    /// COid to split.
    pub coid: Coid,
    /// Cell at which to split, per [`crate::stats::SplitCandidate`].
    pub split_cell: CellKey,
    /// When this request was first enqueued.
    pub first_requested: Instant,
    /// Number of times this request has been dispatched and failed/retried.
    pub retry_count: u32,
}

/// A dedup-by-coid queue of pending split requests, plus a throttle that
/// derives a retry delay from queue depth, accumulated retry time, and the
/// reporting node's size.
pub struct SplitQueue {
    order: VecDeque<Coid>,
    by_coid: rustc_hash::FxHashMap<Coid, PendingSplit>,
}

impl SplitQueue {
    /// An empty queue.
    pub fn new() -> Self {
        SplitQueue { order: VecDeque::new(), by_coid: rustc_hash::FxHashMap::default() }
    }

    /// Enqueues a request for `coid`/`split_cell`. A COid already pending
    /// is not re-enqueued (§4.7 "deduplicated by coid") — its split cell is
    /// refreshed to the latest candidate, since the load has likely shifted
    /// since the original request.
    pub fn request(&mut self, coid: Coid, split_cell: CellKey, now: Instant) {
        if let Some(existing) = self.by_coid.get_mut(&coid) {
            existing.split_cell = split_cell;
            return;
        }
        self.by_coid.insert(coid, PendingSplit { coid, split_cell, first_requested: now, retry_count: 0 });
        self.order.push_back(coid);
    }

    /// Pops the next pending request in FIFO order, if any.
    pub fn pop(&mut self) -> Option<PendingSplit> {
        let coid = self.order.pop_front()?;
        self.by_coid.remove(&coid)
    }

    /// Re-enqueues `split` after a failed dispatch, bumping its retry
    /// count (§4.7 "retries are coalesced" — re-queued at the back rather
    /// than retried immediately, so other pending COids are not starved).
    pub fn retry(&mut self, mut split: PendingSplit) {
        split.retry_count += 1;
        let coid = split.coid;
        self.by_coid.insert(coid, split);
        self.order.push_back(coid);
    }

    /// Number of distinct COids currently pending.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if no requests are pending.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for SplitQueue {
    fn default() -> Self {
        SplitQueue::new()
    }
}

/// Derives the delay to wait before dispatching the next split request,
/// from the signals §4.7 names: queue depth (more pending work means each
/// individual request can wait longer), time already spent retrying this
/// request (exponential-ish backoff), and the node's reported size (a
/// larger node's split is more expensive, so failed attempts against it
/// are retried less eagerly).
pub fn throttle_delay(queue_depth: usize, retry_count: u32, node_size_bytes: u64) -> Duration {
    const BASE_MS: u64 = 50;
    const MAX_MS: u64 = 30_000;

    let backoff = BASE_MS.saturating_mul(1u64 << retry_count.min(16));
    let depth_factor = 1 + (queue_depth as u64 / 4);
    let size_factor = 1 + (node_size_bytes / (64 * 1024 * 1024));

    let ms = backoff.saturating_mul(depth_factor).saturating_mul(size_factor).min(MAX_MS);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coid(n: u64) -> Coid {
        Coid::new(1, n)
    }

    #[test]
    fn duplicate_requests_for_the_same_coid_collapse_to_one() {
        let mut q = SplitQueue::new();
        let now = Instant::now();
        q.request(coid(1), CellKey::Int(1), now);
        q.request(coid(1), CellKey::Int(2), now);
        assert_eq!(q.len(), 1);
        let popped = q.pop().unwrap();
        assert_eq!(popped.split_cell, CellKey::Int(2));
    }

    #[test]
    fn pop_returns_fifo_order() {
        let mut q = SplitQueue::new();
        let now = Instant::now();
        q.request(coid(1), CellKey::Int(1), now);
        q.request(coid(2), CellKey::Int(1), now);
        assert_eq!(q.pop().unwrap().coid, coid(1));
        assert_eq!(q.pop().unwrap().coid, coid(2));
        assert!(q.pop().is_none());
    }

    #[test]
    fn retry_bumps_count_and_requeues_at_the_back() {
        let mut q = SplitQueue::new();
        let now = Instant::now();
        q.request(coid(1), CellKey::Int(1), now);
        q.request(coid(2), CellKey::Int(1), now);
        let first = q.pop().unwrap();
        assert_eq!(first.coid, coid(1));
        q.retry(first);
        // coid(2) should now come before the retried coid(1)
        assert_eq!(q.pop().unwrap().coid, coid(2));
        let retried = q.pop().unwrap();
        assert_eq!(retried.coid, coid(1));
        assert_eq!(retried.retry_count, 1);
    }

    #[test]
    fn throttle_grows_with_retries_depth_and_size() {
        let base = throttle_delay(0, 0, 0);
        let more_retries = throttle_delay(0, 3, 0);
        let more_depth = throttle_delay(20, 0, 0);
        let bigger_node = throttle_delay(0, 0, 200 * 1024 * 1024);
        assert!(more_retries > base);
        assert!(more_depth > base);
        assert!(bigger_node > base);
    }

    #[test]
    fn throttle_delay_is_capped() {
        let delay = throttle_delay(1000, 16, u64::MAX);
        assert_eq!(delay, Duration::from_millis(30_000));
    }
}
