//! Per-thread unique ids used to keep timestamps and transaction ids
//! distinct across a whole cluster: `(node ip-like id, thread slot)`.
//!
//! Grounded in `UniqueId` from the original `gaiatypes.cpp`: a process-wide
//! IP-derived id in the high bits, a per-thread slot in the low 16 bits.

use std::cell::Cell;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

static NODE_ID: AtomicU64 = AtomicU64::new(0);
static NEXT_THREAD_SLOT: AtomicU16 = AtomicU16::new(1);

thread_local! {
    static THREAD_SLOT: Cell<u16> = Cell::new(0);
}

/// Mask covering the low 48 bits used by [`UniqueId::get`].
pub const B48: u64 = 0x0000_ffff_ffff_ffff;

/// Process/thread unique id: `node_id << 16 | thread_slot`.
///
/// `node_id` is set once per process via [`UniqueId::init`] (normally the
/// node's IPv4 address); each OS thread is lazily assigned a distinct
/// 16-bit slot the first time it asks for an id. Two threads can never
/// observe the same value, which is the invariant [`crate::Ts::new`] and
/// [`crate::Tid::new`] depend on for uniqueness.
pub struct UniqueId;

impl UniqueId {
    /// Initialize the process-wide node id component. Idempotent: the first
    /// caller wins, later calls are ignored (mirrors the original's
    /// `if (myid) return;` guard).
    pub fn init(node_id: u32) {
        NODE_ID.compare_exchange(
            0,
            (node_id as u64) << 16,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .ok();
    }

    /// Returns this thread's unique id. Panics if more than 65535 distinct
    /// threads have ever requested one in this process, mirroring the
    /// original's hard limit on the thread-id field width.
    pub fn get() -> u64 {
        let node = NODE_ID.load(Ordering::SeqCst);
        let slot = THREAD_SLOT.with(|c| {
            let v = c.get();
            if v != 0 {
                return v;
            }
            let assigned = NEXT_THREAD_SLOT.fetch_add(1, Ordering::SeqCst);
            assert!(assigned != 0, "exhausted 16-bit thread-slot space");
            c.set(assigned);
            assigned
        });
        node | slot as u64
    }
}
