//! `TxRawCoid`: the uncompressed, append-only log of operations a single
//! transaction has issued against a single COid, tagged with the
//! subtransaction level active when each was recorded (§3.3).

use gaia_core::{CellKey, IntervalType, ListCell, RcKeyInfo, SuperValue};
use std::sync::Arc;

use crate::tucoid::{Checkpoint, ListOp, TxUpdateCoid};

/// One recorded operation, independent of subtransaction bookkeeping.
#[derive(Debug, Clone)]
pub enum TxOp {
    /// Insert-or-replace a cell (§4.4.7 `Add`).
    Add {
        /// The cell to add.
        cell: ListCell,
        /// Collation descriptor to graft onto the target supervalue, if
        /// this is the first operation to supply one.
        prki: Option<RcKeyInfo>,
    },
    /// Delete a key range (§6.4).
    DelRange {
        /// Inclusive/exclusive/unbounded start key.
        start: Option<CellKey>,
        /// Inclusive/exclusive/unbounded end key.
        end: Option<CellKey>,
        /// Boundary interpretation.
        interval: IntervalType,
    },
    /// Overwrite with a plain value.
    Write(Vec<u8>),
    /// Overwrite with a supervalue.
    WriteSv(SuperValue),
    /// Set one attribute slot.
    AttrSet {
        /// Attribute index.
        attr_id: u16,
        /// New value.
        value: u64,
    },
    /// A read, recorded for the transaction's read set but dropped during
    /// compression (§4.5 "Read items are dropped").
    Read,
}

/// A single raw op plus the subtransaction level it was recorded at.
#[derive(Debug, Clone)]
pub struct TxListItem {
    /// The operation itself.
    pub op: TxOp,
    /// Subtransaction depth active when this item was appended.
    pub level: i16,
}

/// Append-only per-(tid, coid) operation log plus a lazily (re)computed
/// compressed form.
///
/// Invariant: the cached `TxUpdateCoid` is invalidated on any mutation to
/// `items`; `compress` is pure and idempotent given an unchanged `items`.
#[derive(Debug, Default)]
pub struct TxRawCoid {
    items: Vec<TxListItem>,
    cached: Option<Arc<TxUpdateCoid>>,
}

impl TxRawCoid {
    /// Empty raw op list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new operation at the given subtransaction level,
    /// invalidating any cached compression.
    pub fn push(&mut self, op: TxOp, level: i16) {
        self.items.push(TxListItem { op, level });
        self.cached = None;
    }

    /// Raw items recorded so far, in order.
    pub fn items(&self) -> &[TxListItem] {
        &self.items
    }

    /// Compresses the raw op list into a `TxUpdateCoid`, caching the
    /// result until the next mutation.
    pub fn compress(&mut self) -> Arc<TxUpdateCoid> {
        if let Some(cached) = &self.cached {
            return Arc::clone(cached);
        }
        let mut tucoid = TxUpdateCoid::default();
        for item in &self.items {
            match &item.op {
                TxOp::Write(v) => {
                    tucoid = TxUpdateCoid::default();
                    tucoid.checkpoint = Some(Checkpoint::Write(v.clone()));
                }
                TxOp::WriteSv(sv) => {
                    tucoid = TxUpdateCoid::default();
                    tucoid.checkpoint = Some(Checkpoint::WriteSv(sv.clone()));
                }
                TxOp::AttrSet { attr_id, value } => {
                    tucoid.set_attr(*attr_id, *value);
                }
                TxOp::Add { cell, prki } => {
                    tucoid.items.push(ListOp::Add(cell.clone(), prki.clone()));
                }
                TxOp::DelRange { start, end, interval } => {
                    tucoid.items.push(ListOp::DelRange {
                        start: start.clone(),
                        end: end.clone(),
                        interval: *interval,
                    });
                }
                TxOp::Read => {}
            }
        }
        let arc = Arc::new(tucoid);
        self.cached = Some(Arc::clone(&arc));
        arc
    }

    /// Discards every item recorded at a subtransaction depth greater than
    /// `level` (subtransaction abort). Returns `true` if the raw list is
    /// now empty, signaling the caller to drop this COid from the
    /// transaction entirely.
    pub fn abort_level(&mut self, level: i16) -> bool {
        self.items.retain(|it| it.level <= level);
        self.cached = None;
        self.items.is_empty()
    }

    /// Folds every item recorded at a subtransaction depth greater than
    /// `level` down to `level` (subtransaction release), preserving order
    /// and cardinality.
    pub fn release_level(&mut self, level: i16) {
        for item in &mut self.items {
            if item.level > level {
                item.level = level;
            }
        }
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaia_core::CellKey;

    fn add(k: i64, level: i16) -> TxOp {
        TxOp::Add {
            cell: ListCell { key: CellKey::Int(k), value: k as u64 },
            prki: None,
        }
    }

    #[test]
    fn write_discards_prior_ops() {
        let mut raw = TxRawCoid::new();
        raw.push(add(1, 0), 0);
        raw.push(TxOp::Write(b"hello".to_vec()), 0);
        let tucoid = raw.compress();
        assert!(matches!(tucoid.checkpoint, Some(Checkpoint::Write(ref v)) if v == b"hello"));
        assert!(tucoid.items.is_empty());
    }

    #[test]
    fn attrset_after_write_applies_on_top() {
        let mut raw = TxRawCoid::new();
        raw.push(TxOp::WriteSv(gaia_core::SuperValue::new(2, gaia_core::CellType::IntKey)), 0);
        raw.push(TxOp::AttrSet { attr_id: 0, value: 42 }, 0);
        let tucoid = raw.compress();
        assert!(tucoid.checkpoint.is_some());
        assert_eq!(tucoid.attr(0), Some(42));
    }

    #[test]
    fn scenario_6_subtrans_abort() {
        // spec §8.3 scenario 6
        let mut raw = TxRawCoid::new();
        raw.push(add(1, 0), 0); // Add(k1, lvl=0)
        raw.push(add(2, 1), 1); // Add(k2, lvl=1)
        raw.push(TxOp::AttrSet { attr_id: 0, value: 42 }, 1); // lvl=1

        let mut expected = TxRawCoid::new();
        expected.push(add(1, 0), 0);

        raw.abort_level(0);
        let got = raw.compress();
        let want = expected.compress();
        assert_eq!(got.items.len(), want.items.len());
        assert_eq!(got.set_attrs_len(), want.set_attrs_len());
    }

    #[test]
    fn abort_level_reports_emptiness() {
        let mut raw = TxRawCoid::new();
        raw.push(add(1, 2), 2);
        assert!(raw.abort_level(0));
    }

    #[test]
    fn release_level_preserves_order_and_count() {
        let mut raw = TxRawCoid::new();
        raw.push(add(1, 0), 0);
        raw.push(add(2, 2), 2);
        raw.push(add(3, 1), 1);
        raw.release_level(0);
        assert_eq!(raw.items().len(), 3);
        assert!(raw.items().iter().all(|it| it.level == 0));
    }

    #[test]
    fn compress_is_cached_until_mutation() {
        let mut raw = TxRawCoid::new();
        raw.push(add(1, 0), 0);
        let a = raw.compress();
        let b = raw.compress();
        assert!(Arc::ptr_eq(&a, &b));
        raw.push(add(2, 0), 0);
        let c = raw.compress();
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
