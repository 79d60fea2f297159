//! Container-object identifier: the unit of storage and locking.

use std::fmt;

/// `(cid, oid)`: `cid` names a container (conceptually a table or index),
/// `oid` names an object within it. Totally ordered by `(cid, oid)`, which
/// is what `gaia-logmem`'s lock striping and `gaia-splitter`'s per-cid
/// grouping both rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Coid {
    /// Container id (table/index).
    pub cid: u64,
    /// Object id within the container.
    pub oid: u64,
}

impl Coid {
    /// Builds a `Coid` from its two components.
    pub const fn new(cid: u64, oid: u64) -> Self {
        Coid { cid, oid }
    }
}

impl fmt::Display for Coid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.cid, self.oid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_cid_then_oid() {
        assert!(Coid::new(1, 5) < Coid::new(2, 0));
        assert!(Coid::new(1, 5) < Coid::new(1, 6));
        assert!(Coid::new(1, 5) == Coid::new(1, 5));
    }
}
