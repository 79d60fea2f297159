//! Hybrid-logical-clock timestamp (C1): 128 bits, microsecond resolution,
//! per-thread strictly monotonic, globally unique, slewable forward when a
//! remote peer is observed to be ahead.
//!
//! Grounded in `Timestamp` from the original `gaiatypes.{h,cpp}`. Layout:
//! `d[0]` holds a debugging magic plus microseconds-since-epoch (low 48
//! bits); `d[1]` holds a per-microsecond disambiguating counter (top 16
//! bits) plus this thread's [`crate::UniqueId`] (low 48 bits). Lexicographic
//! comparison of `(d[0], d[1])` is therefore comparison of `(us, counter,
//! node)`, exactly as spec'd.

use crate::uniqueid::{UniqueId, B48};
use std::cell::Cell;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

const B16: u64 = 0x0000_ffff;
const TS_MAGIC: u64 = 0xbeec_0000_0000_0000;

thread_local! {
    static ADVANCE: Cell<i64> = Cell::new(0);
    static COUNT: Cell<u32> = Cell::new(0);
    static LAST_US: Cell<u64> = Cell::new(0);
}

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_micros() as u64
}

/// A 128-bit hybrid-logical timestamp. Totally ordered, thread-safe to copy
/// and compare, but `new()` is only strictly monotonic *within* the thread
/// that calls it (see module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Ts {
    d0: u64,
    d1: u64,
}

impl Ts {
    /// Returns a fresh, strictly-monotonic-within-this-thread timestamp.
    pub fn new() -> Self {
        let advance = ADVANCE.with(|c| c.get());
        let mut us = ((now_us() as i64) + advance) as u64 & B48;
        let count = COUNT.with(|c| {
            let last = LAST_US.with(|l| l.get());
            if us != last {
                LAST_US.with(|l| l.set(us));
                c.set(0);
                0
            } else {
                let next = c.get() + 1;
                if next & (B16 as u32) << 16 != 0 {
                    // counter overflowed within this microsecond: borrow one
                    // microsecond from the future to keep monotonicity.
                    us = (us + 1) & B48;
                    LAST_US.with(|l| l.set(us));
                    c.set(0);
                    0
                } else {
                    c.set(next);
                    next
                }
            }
        });
        let d0 = TS_MAGIC | us;
        let d1 = (count as u64) << 48 | (UniqueId::get() & B48);
        Ts { d0, d1 }
    }

    /// The smallest representable timestamp (still unique per-thread).
    pub fn lowest() -> Self {
        Ts {
            d0: TS_MAGIC,
            d1: UniqueId::get() & B48,
        }
    }

    /// The largest representable timestamp (still unique per-thread).
    pub fn highest() -> Self {
        Ts {
            d0: TS_MAGIC | B48,
            d1: (B16 << 48) | (UniqueId::get() & B48),
        }
    }

    /// Sentinel meaning "no real timestamp" / "latest safe snapshot",
    /// distinguished from every real timestamp because it never carries the
    /// debugging magic.
    pub fn illegal() -> Self {
        Ts { d0: 0, d1: 0 }
    }

    /// True for the [`Ts::illegal`] sentinel.
    pub fn is_illegal(&self) -> bool {
        self.d0 & TS_MAGIC != TS_MAGIC
    }

    /// Milliseconds elapsed since this timestamp was minted, as observed by
    /// the calling thread's clock (including its `advance` correction).
    pub fn age_ms(&self) -> i64 {
        self.age_us() / 1000
    }

    /// Microseconds elapsed since this timestamp was minted.
    pub fn age_us(&self) -> i64 {
        let advance = ADVANCE.with(|c| c.get());
        let now = ((now_us() as i64) + advance) as u64 & B48;
        let then = self.d0 & B48;
        (now as i64) - (then as i64)
    }

    /// Bumps this timestamp by the smallest representable increment,
    /// carrying into the microsecond field on counter overflow.
    pub fn add_epsilon(&mut self) {
        let c = (self.d1 >> 48) + 1;
        if c & (B16 << 16) != 0 {
            self.d0 = self.d0.wrapping_add(1);
            self.d1 = UniqueId::get() & B48;
        } else {
            self.d1 = (c << 48) | (UniqueId::get() & B48);
        }
    }

    /// If `observed` is at or ahead of this thread's local clock, slews the
    /// thread-local clock offset forward so that the *next* [`Ts::new`]
    /// strictly exceeds `observed`. Idempotent with respect to smaller
    /// observations: only ever moves the clock forward.
    pub fn catchup(observed: Ts) {
        let observed_us = observed.d0 & B48;
        let now = now_us() & B48;
        let advance = ADVANCE.with(|c| c.get());
        let delta = observed_us as i64 - now as i64;
        if delta >= advance {
            if delta > advance {
                ADVANCE.with(|c| c.set(delta));
            }
            let next_count = (observed.d1 >> 48) + 1;
            if next_count & (B16 << 16) != 0 {
                COUNT.with(|c| c.set(0));
                ADVANCE.with(|c| c.set(c.get() + 1));
                LAST_US.with(|l| l.set((observed_us + 1) & B48));
            } else {
                COUNT.with(|c| c.set(next_count as u32));
                LAST_US.with(|l| l.set(observed_us));
            }
        }
    }

    /// Microseconds-since-epoch component, ignoring the debugging magic.
    pub fn micros(&self) -> u64 {
        self.d0 & B48
    }

    /// Shifts the microseconds component by `us` microseconds (negative to
    /// move backward), leaving the counter/node disambiguator untouched.
    pub fn add_us(&mut self, us: i64) {
        let new_us = (self.d0 & B48) as i64 + us;
        self.d0 = TS_MAGIC | ((new_us as u64) & B48);
    }

    /// Shifts the microseconds component by `ms` milliseconds. Mirrors the
    /// original's `Timestamp::addMs`; used by GC to compute a staleness
    /// cutoff relative to a reference timestamp.
    pub fn add_ms(&mut self, ms: i64) {
        self.add_us(ms * 1000);
    }
}

impl Default for Ts {
    fn default() -> Self {
        Ts::illegal()
    }
}

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_illegal() {
            write!(f, "Ts(illegal)")
        } else {
            write!(f, "Ts(us={}, ctr={}, node={:#x})", self.micros(), self.d1 >> 48, self.d1 & B48)
        }
    }
}
