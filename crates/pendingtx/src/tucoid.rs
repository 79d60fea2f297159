//! `TxUpdateCoid`: the compressed representation of one transaction's
//! effect on one COid (§3.3). At most one checkpoint (`Write`/`WriteSv`), a
//! sparse `AttrSet` map, and an ordered list of post-write `Add`/`DelRange`
//! items, plus a lazily-built index over the `Add` keys for fast conflict
//! probing (§4.5.1 `SLAddItems`).

use gaia_core::{CellKey, IntervalType, ListCell, RcKeyInfo, SuperValue};
use once_cell::sync::OnceCell;
use rustc_hash::FxHashSet;
use std::collections::HashMap;

/// What this transaction wrote wholesale to the COid, if anything.
#[derive(Debug, Clone)]
pub enum Checkpoint {
    /// Overwrite with a plain value.
    Write(Vec<u8>),
    /// Overwrite with a supervalue.
    WriteSv(SuperValue),
}

/// A single post-checkpoint list operation.
#[derive(Debug, Clone)]
pub enum ListOp {
    /// Insert-or-replace a cell.
    Add(ListCell, Option<RcKeyInfo>),
    /// Delete a key range.
    DelRange {
        /// Start boundary.
        start: Option<CellKey>,
        /// End boundary.
        end: Option<CellKey>,
        /// Boundary interpretation.
        interval: IntervalType,
    },
}

/// Compressed per-COid effect of one transaction.
#[derive(Debug, Default)]
pub struct TxUpdateCoid {
    /// At most one whole-object overwrite.
    pub(crate) checkpoint: Option<Checkpoint>,
    /// Sparse overwritten-attribute map: attribute id -> new value. Only
    /// entries present here were touched by this transaction (§3.3
    /// `SetAttrs[i] == 1` invariant).
    set_attrs: HashMap<u16, u64>,
    /// Ordered Add/DelRange items recorded after the checkpoint (or the
    /// whole list, if there is no checkpoint).
    pub(crate) items: Vec<ListOp>,
    /// Lazily built index of `Add` keys, populated once the transaction
    /// freezes (at prepare) and reused across every conflict probe against
    /// concurrently prepared transactions.
    add_index: OnceCell<FxHashSet<CellKey>>,
}

impl TxUpdateCoid {
    /// Builds a tucoid carrying only a checkpoint, no attrs or list items.
    /// Used by `gaia-logmem` to hold a read's materialized forward-walk
    /// result (§4.4.2 step 7) and to seed a COid's first log entry from a
    /// disk checkpoint (§4.4.1).
    pub fn from_checkpoint(checkpoint: Checkpoint) -> Self {
        TxUpdateCoid {
            checkpoint: Some(checkpoint),
            ..Default::default()
        }
    }

    /// Sets (overwrites) one attribute.
    pub fn set_attr(&mut self, attr_id: u16, value: u64) {
        self.set_attrs.insert(attr_id, value);
    }

    /// Appends one post-checkpoint list operation. Used by `gaia-wal` to
    /// rebuild a tucoid from its decoded on-disk record body (§4.6).
    pub fn push_item(&mut self, op: ListOp) {
        self.items.push(op);
    }

    /// Looks up an attribute this transaction overwrote, if any.
    pub fn attr(&self, attr_id: u16) -> Option<u64> {
        self.set_attrs.get(&attr_id).copied()
    }

    /// Number of distinct attributes this transaction overwrote.
    pub fn set_attrs_len(&self) -> usize {
        self.set_attrs.len()
    }

    /// Iterates over `(attr_id, value)` pairs this transaction overwrote.
    pub fn set_attrs_iter(&self) -> impl Iterator<Item = (u16, u64)> + '_ {
        self.set_attrs.iter().map(|(k, v)| (*k, *v))
    }

    /// Checkpoint this transaction wrote, if any.
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoint.as_ref()
    }

    /// The ordered Add/DelRange items, excluding any checkpoint.
    pub fn list_items(&self) -> &[ListOp] {
        &self.items
    }

    /// True if this tucoid carries a whole-object overwrite.
    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    /// Lazily builds (once) and returns the set of keys this transaction
    /// `Add`ed, for O(1) intersection probing against another tucoid's
    /// `Add` set (§4.5.1 `SLAddItems`).
    pub fn add_keys(&self) -> &FxHashSet<CellKey> {
        self.add_index.get_or_init(|| {
            self.items
                .iter()
                .filter_map(|op| match op {
                    ListOp::Add(cell, _) => Some(cell.key.clone()),
                    ListOp::DelRange { .. } => None,
                })
                .collect()
        })
    }

    /// Iterates over the `DelRange` items only.
    pub fn del_ranges(&self) -> impl Iterator<Item = (&Option<CellKey>, &Option<CellKey>, IntervalType)> {
        self.items.iter().filter_map(|op| match op {
            ListOp::DelRange { start, end, interval } => Some((start, end, *interval)),
            ListOp::Add(..) => None,
        })
    }

    /// Applies this tucoid's deltas onto `sv` in place (§4.4.7). Returns an
    /// error if this tucoid carries a checkpoint — callers must not mix a
    /// whole-object overwrite with delta application.
    pub fn apply_to(&self, sv: &mut SuperValue) -> Result<(), &'static str> {
        if self.checkpoint.is_some() {
            return Err("cannot apply a checkpoint-carrying tucoid as a delta");
        }
        for (attr_id, value) in self.set_attrs_iter() {
            sv.set_attr(attr_id, value).map_err(|_| "attribute id out of range")?;
        }
        for op in &self.items {
            match op {
                ListOp::Add(cell, prki) => sv.insert_or_replace(cell.clone(), prki.clone()),
                ListOp::DelRange { start, end, interval } => {
                    sv.delete_range(start.as_ref(), end.as_ref(), *interval)
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaia_core::{CellType, SuperValue};

    #[test]
    fn apply_to_rejects_checkpoint_carrying_tucoid() {
        let mut t = TxUpdateCoid::default();
        t.checkpoint = Some(Checkpoint::Write(vec![]));
        let mut sv = SuperValue::new(0, CellType::IntKey);
        assert!(t.apply_to(&mut sv).is_err());
    }

    #[test]
    fn add_keys_caches_across_calls() {
        let mut t = TxUpdateCoid::default();
        t.items.push(ListOp::Add(
            ListCell { key: CellKey::Int(1), value: 1 },
            None,
        ));
        let a = t.add_keys() as *const _;
        let b = t.add_keys() as *const _;
        assert_eq!(a, b);
    }
}
