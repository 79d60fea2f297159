//! Transaction identifiers: 128 bits, opaque, compared only for equality.
//!
//! Grounded in `Tid` from `gaiatypes.{h,cpp}`: a node-unique id, seconds of
//! wall-clock time, and a per-process counter, concatenated.

use crate::uniqueid::UniqueId;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Opaque 128-bit transaction id. `PartialEq`/`Eq`/`Hash` are the only
/// operations clients of this type should rely on; ordering has no defined
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Tid {
    d1: u64,
    d2: u64,
}

impl Tid {
    /// Mints a fresh transaction id, unique across the whole cluster as
    /// long as [`UniqueId`] is distinct per node/thread.
    pub fn new() -> Self {
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs();
        Tid {
            d1: UniqueId::get(),
            d2: (secs << 32) | counter as u64,
        }
    }

    /// Raw 128-bit representation, for wire encoding.
    pub fn to_raw(self) -> (u64, u64) {
        (self.d1, self.d2)
    }

    /// Reconstructs a `Tid` from its raw wire representation.
    pub fn from_raw(d1: u64, d2: u64) -> Self {
        Tid { d1, d2 }
    }
}

impl Default for Tid {
    fn default() -> Self {
        Tid::new()
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tid({:016x}{:016x})", self.d1, self.d2)
    }
}
