//! Per-COid/per-cell access statistics and heavy-hitter detection (§4.7
//! "`LoadStats`... `check()`").
//!
//! Grounded in the original's `splitterclient.cpp` stat-collection table;
//! the cumulative-crossing split-cell search is the original's documented
//! heuristic, kept verbatim (find the index where the running sum of
//! per-cell counts first exceeds half the coid's total).

use gaia_core::{CellKey, Coid};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Access counters for one COid: a coarse hit count plus, once a COid has
/// been hit more than once, per-cell counts fine-grained enough to find a
/// good split point.
#[derive(Default)]
struct CoidStats {
    hits: AtomicU64,
    cells: parking_lot::Mutex<FxHashMap<CellKey, u64>>,
}

/// A COid identified as a heavy hitter, with the cell at which it should
/// be split (§4.7: "cumulative count crosses 50%").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitCandidate {
    /// The overloaded COid.
    pub coid: Coid,
    /// The cell key at which the cumulative count first exceeds half the
    /// COid's total recorded cell hits.
    pub split_cell: CellKey,
}

/// Maps COid to access counters; `report` is called on the request path
/// (§4.7), `check` runs periodically from the splitter's own thread.
pub struct LoadStats {
    heavy_hitter_threshold: u64,
    per_coid: dashmap::DashMap<Coid, CoidStats>,
}

impl LoadStats {
    /// A fresh stats table. `heavy_hitter_threshold` is the `Hits` count
    /// above which a COid is even considered for splitting.
    pub fn new(heavy_hitter_threshold: u64) -> Self {
        LoadStats { heavy_hitter_threshold, per_coid: dashmap::DashMap::new() }
    }

    /// Records one access to `coid` at `cell`. The first access to a COid
    /// only bumps `Hits`; from the second access on, the specific cell's
    /// count is also recorded, so `check` has something to search over
    /// once a COid is actually a candidate.
    pub fn report(&self, coid: Coid, cell: CellKey) {
        let entry = self.per_coid.entry(coid).or_default();
        let prior_hits = entry.hits.fetch_add(1, Ordering::Relaxed);
        if prior_hits > 0 {
            *entry.cells.lock().entry(cell).or_insert(0) += 1;
        }
    }

    /// Scans every tracked COid and returns a split candidate for each one
    /// whose `Hits` exceeds the heavy-hitter threshold and whose per-cell
    /// counts are non-empty (a COid hit exactly once never gets a cell
    /// recorded and is skipped rather than guessing a split point).
    pub fn check(&self) -> Vec<SplitCandidate> {
        let mut candidates = Vec::new();
        for entry in self.per_coid.iter() {
            let hits = entry.hits.load(Ordering::Relaxed);
            if hits <= self.heavy_hitter_threshold {
                continue;
            }
            let cells = entry.cells.lock();
            if let Some(split_cell) = cumulative_crossing_cell(&cells) {
                debug!(coid = %entry.key(), hits, "heavy hitter crossed threshold");
                candidates.push(SplitCandidate { coid: *entry.key(), split_cell });
            }
        }
        candidates
    }

    /// Drops all recorded state for `coid`, e.g. once a split for it has
    /// been dispatched and its counts no longer describe the (now
    /// smaller) resulting node.
    pub fn clear(&self, coid: Coid) {
        self.per_coid.remove(&coid);
    }
}

/// Finds the cell key at which the running sum of per-cell counts first
/// exceeds half the total. Iteration order over an `FxHashMap` is
/// unspecified, so counts are sorted by key first — the original compares
/// against the supervalue's own cell order, which this layer does not have
/// visibility into; sorting by key is the closest stable approximation
/// available from counts alone (see `DESIGN.md`).
fn cumulative_crossing_cell(cells: &FxHashMap<CellKey, u64>) -> Option<CellKey> {
    if cells.is_empty() {
        return None;
    }
    let total: u64 = cells.values().sum();
    let half = total / 2;
    let mut sorted: Vec<(&CellKey, &u64)> = cells.iter().collect();
    sorted.sort_by(|a, b| cell_key_sort_order(a.0).cmp(&cell_key_sort_order(b.0)));
    let mut running = 0u64;
    for (key, count) in sorted {
        running += count;
        if running > half {
            return Some(key.clone());
        }
    }
    None
}

fn cell_key_sort_order(key: &CellKey) -> (i64, Vec<Vec<u8>>) {
    match key {
        CellKey::Int(i) => (*i, Vec::new()),
        CellKey::Bytes(fields) => (i64::MIN, fields.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaia_core::Coid;

    fn coid(n: u64) -> Coid {
        Coid::new(1, n)
    }

    #[test]
    fn single_access_is_not_a_candidate() {
        let stats = LoadStats::new(0);
        stats.report(coid(1), CellKey::Int(5));
        assert!(stats.check().is_empty());
    }

    #[test]
    fn heavy_hitter_crosses_the_midpoint_cell() {
        let stats = LoadStats::new(2);
        let c = coid(1);
        for _ in 0..10 {
            stats.report(c, CellKey::Int(1));
        }
        for _ in 0..1 {
            stats.report(c, CellKey::Int(2));
        }
        let candidates = stats.check();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].coid, c);
        assert_eq!(candidates[0].split_cell, CellKey::Int(1));
    }

    #[test]
    fn below_threshold_coid_is_not_reported() {
        let stats = LoadStats::new(100);
        let c = coid(2);
        for _ in 0..5 {
            stats.report(c, CellKey::Int(1));
        }
        assert!(stats.check().is_empty());
    }

    #[test]
    fn clear_forgets_a_coid() {
        let stats = LoadStats::new(0);
        let c = coid(3);
        stats.report(c, CellKey::Int(1));
        stats.report(c, CellKey::Int(1));
        stats.clear(c);
        assert!(stats.check().is_empty());
    }
}
