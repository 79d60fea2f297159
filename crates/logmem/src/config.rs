//! Tunables for the in-memory log (§4.4.2 step 7, §4.4.6), named after the
//! original's `LOG_CHECKPOINT_MIN_*` / `LOG_STALE_GC_MS` constants
//! (`logmem.cpp`, `logmem.h`). The original hard-codes these; we keep the
//! same defaults but make them a runtime `LogConfig` so a node can tune GC
//! aggressiveness without a rebuild.

/// Snapshot-insertion and GC thresholds for `LogInMemory`.
#[derive(Debug, Clone, Copy)]
pub struct LogConfig {
    /// Forward-walk entries crossed during a read before a snapshot entry
    /// is synthesized for future reads (§4.4.2 step 7).
    pub min_items: usize,
    /// Forward-walk accumulated `Add` items before synthesizing a snapshot.
    pub min_add_items: usize,
    /// Forward-walk accumulated `DelRange` items before synthesizing a
    /// snapshot.
    pub min_delrange_items: usize,
    /// GC keeps entries at or after `reference_ts - stale_gc_ms` relative to
    /// the highest checkpoint older than that cutoff (§4.4.6).
    pub stale_gc_ms: i64,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            min_items: 16,
            min_add_items: 8,
            min_delrange_items: 4,
            stale_gc_ms: 60_000,
        }
    }
}
