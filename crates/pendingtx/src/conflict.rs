//! Conflict detection between two transactions' compressed effects on the
//! same COid (§4.5.1), used at prepare time to decide YES/NO.

use crate::tucoid::TxUpdateCoid;
use gaia_core::{IntervalType, RcKeyInfo};

/// Runtime policy for the one documented compile-time switch in the
/// original (§4.5.1, §9 open question #2): whether two `DelRange`s always
/// conflict, or may be allowed to coexist. Kept conservative by default, as
/// the original does, because relaxing it is only safe once the index
/// layer above this store has agreed on range-delete semantics — a
/// decision outside this crate's scope (see `DESIGN.md`).
#[derive(Debug, Clone, Copy)]
pub struct ConflictPolicy {
    /// If true (default), any two `DelRange`s on the same COid conflict
    /// unconditionally, regardless of whether their ranges overlap.
    pub delrange_delrange_always_conflicts: bool,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy {
            delrange_delrange_always_conflicts: true,
        }
    }
}

/// Tests whether `a` and `b` — two transactions' compressed effects on the
/// same COid — conflict, per §4.5.1:
///
/// 1. Either carrying a checkpoint (`Write`/`WriteSv`) conflicts with
///    anything.
/// 2. Overlapping overwritten-attribute sets conflict.
/// 3. Two `Add`s of the same key conflict.
/// 4. An `Add` whose key falls inside the other's `DelRange` conflicts.
/// 5. Two `DelRange`s conflict per `policy`.
pub fn has_conflicts(a: &TxUpdateCoid, b: &TxUpdateCoid, policy: ConflictPolicy, rki: Option<&RcKeyInfo>) -> bool {
    if a.has_checkpoint() || b.has_checkpoint() {
        return true;
    }

    if a.set_attrs_iter().any(|(id, _)| b.attr(id).is_some()) {
        return true;
    }

    if a.add_keys().iter().any(|k| b.add_keys().contains(k)) {
        return true;
    }

    let cmp = |x: &gaia_core::CellKey, y: &gaia_core::CellKey| key_cmp(x, y, rki);

    for key in a.add_keys() {
        for (start, end, interval) in b.del_ranges() {
            if interval.contains(key, start.as_ref(), end.as_ref(), cmp) {
                return true;
            }
        }
    }
    for key in b.add_keys() {
        for (start, end, interval) in a.del_ranges() {
            if interval.contains(key, start.as_ref(), end.as_ref(), cmp) {
                return true;
            }
        }
    }

    let a_has_delrange = a.del_ranges().next().is_some();
    let b_has_delrange = b.del_ranges().next().is_some();
    if policy.delrange_delrange_always_conflicts && a_has_delrange && b_has_delrange {
        return true;
    }
    if !policy.delrange_delrange_always_conflicts && a_has_delrange && b_has_delrange {
        for (astart, aend, ait) in a.del_ranges() {
            for (bstart, bend, bit) in b.del_ranges() {
                if IntervalType::ranges_overlap(
                    (&ait, astart.as_ref(), aend.as_ref()),
                    (&bit, bstart.as_ref(), bend.as_ref()),
                    cmp,
                ) {
                    return true;
                }
            }
        }
    }

    false
}

fn key_cmp(a: &gaia_core::CellKey, b: &gaia_core::CellKey, rki: Option<&RcKeyInfo>) -> std::cmp::Ordering {
    use gaia_core::CellKey::*;
    match (a, b) {
        (Int(x), Int(y)) => x.cmp(y),
        (Bytes(x), Bytes(y)) => match rki {
            Some(rki) => rki.compare(x, y),
            None => x.cmp(y),
        },
        _ => std::cmp::Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{TxOp, TxRawCoid};
    use gaia_core::{CellKey, IntervalType, ListCell};
    use proptest::prelude::*;

    #[test]
    fn scenario_5_add_vs_delrange_conflicts() {
        // spec §8.3 scenario 5: A prepared with Add(k); B proposes DelRange([k,k])
        let mut a = TxRawCoid::new();
        a.push(
            TxOp::Add {
                cell: ListCell { key: CellKey::Int(7), value: 1 },
                prki: None,
            },
            0,
        );
        let mut b = TxRawCoid::new();
        b.push(
            TxOp::DelRange {
                start: Some(CellKey::Int(7)),
                end: Some(CellKey::Int(7)),
                interval: IntervalType::decode(4).unwrap(), // [7,7]
            },
            0,
        );
        let ta = a.compress();
        let tb = b.compress();
        assert!(has_conflicts(&ta, &tb, ConflictPolicy::default(), None));
    }

    #[test]
    fn disjoint_adds_do_not_conflict() {
        let mut a = TxRawCoid::new();
        a.push(TxOp::Add { cell: ListCell { key: CellKey::Int(1), value: 1 }, prki: None }, 0);
        let mut b = TxRawCoid::new();
        b.push(TxOp::Add { cell: ListCell { key: CellKey::Int(2), value: 2 }, prki: None }, 0);
        let ta = a.compress();
        let tb = b.compress();
        assert!(!has_conflicts(&ta, &tb, ConflictPolicy::default(), None));
    }

    #[test]
    fn two_delranges_conflict_conservatively_by_default() {
        let mut a = TxRawCoid::new();
        a.push(
            TxOp::DelRange { start: Some(CellKey::Int(1)), end: Some(CellKey::Int(2)), interval: IntervalType::decode(4).unwrap() },
            0,
        );
        let mut b = TxRawCoid::new();
        b.push(
            TxOp::DelRange { start: Some(CellKey::Int(100)), end: Some(CellKey::Int(200)), interval: IntervalType::decode(4).unwrap() },
            0,
        );
        let ta = a.compress();
        let tb = b.compress();
        assert!(has_conflicts(&ta, &tb, ConflictPolicy::default(), None));
        let relaxed = ConflictPolicy { delrange_delrange_always_conflicts: false };
        assert!(!has_conflicts(&ta, &tb, relaxed, None));
    }

    #[test]
    fn any_checkpoint_conflicts_with_anything() {
        let mut a = TxRawCoid::new();
        a.push(TxOp::Write(b"x".to_vec()), 0);
        let b = TxRawCoid::new();
        let ta = a.compress();
        let tb = b.compress();
        assert!(has_conflicts(&ta, &tb, ConflictPolicy::default(), None));
    }

    fn coid_of_int_adds(keys: &[i64]) -> TxUpdateCoid {
        let mut raw = TxRawCoid::new();
        for &k in keys {
            raw.push(TxOp::Add { cell: ListCell { key: CellKey::Int(k), value: 0 }, prki: None }, 0);
        }
        raw.compress()
    }

    proptest! {
        // §4.5.1's definition has no notion of "first" vs. "second"
        // transaction, so swapping the arguments must never change the
        // verdict — true for any set of plain `Add`s regardless of which
        // keys happen to collide.
        #[test]
        fn conflict_detection_is_symmetric_for_adds(
            a_keys in prop::collection::vec(-10i64..10, 0..6),
            b_keys in prop::collection::vec(-10i64..10, 0..6),
        ) {
            let ta = coid_of_int_adds(&a_keys);
            let tb = coid_of_int_adds(&b_keys);
            let policy = ConflictPolicy::default();
            prop_assert_eq!(
                has_conflicts(&ta, &tb, policy, None),
                has_conflicts(&tb, &ta, policy, None),
            );
        }
    }
}
