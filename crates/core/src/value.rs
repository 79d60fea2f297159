//! Stored-value model (§3.2): a stored object is either an opaque `Value`
//! or a structured `SuperValue` — fixed attribute slots plus an ordered set
//! of keyed cells compared under a collation descriptor (`RcKeyInfo`).

use crate::error::{Error, Result};
use crate::interval::IntervalType;
use std::cmp::Ordering;

/// One of the two shapes a stored object can take.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum StoredValue {
    /// Opaque byte sequence.
    Value(Vec<u8>),
    /// Structured record: fixed attributes plus an ordered cell set.
    SuperValue(SuperValue),
}

impl StoredValue {
    /// Name used in [`Error::WrongType`] messages.
    pub fn variant_name(&self) -> &'static str {
        match self {
            StoredValue::Value(_) => "Value",
            StoredValue::SuperValue(_) => "SuperValue",
        }
    }

    /// Borrows the plain value, or returns `WrongType`.
    pub fn as_value(&self) -> Result<&[u8]> {
        match self {
            StoredValue::Value(v) => Ok(v),
            StoredValue::SuperValue(_) => Err(Error::WrongType {
                expected: "Value",
                actual: "SuperValue",
            }),
        }
    }

    /// Borrows the supervalue, or returns `WrongType`.
    pub fn as_supervalue(&self) -> Result<&SuperValue> {
        match self {
            StoredValue::SuperValue(sv) => Ok(sv),
            StoredValue::Value(_) => Err(Error::WrongType {
                expected: "SuperValue",
                actual: "Value",
            }),
        }
    }

    /// Mutably borrows the supervalue, or returns `WrongType`.
    pub fn as_supervalue_mut(&mut self) -> Result<&mut SuperValue> {
        match self {
            StoredValue::SuperValue(sv) => Ok(sv),
            StoredValue::Value(_) => Err(Error::WrongType {
                expected: "SuperValue",
                actual: "Value",
            }),
        }
    }
}

/// Discriminates how a supervalue's cell keys are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CellType {
    /// Keys are plain `i64`s, compared numerically.
    IntKey,
    /// Keys are one or more length-prefixed byte fields, compared under a
    /// [`RcKeyInfo`] collation descriptor.
    BinaryKey,
}

/// A cell's key: either an integer or a composite sequence of byte fields
/// (one entry per collated field in the owning supervalue's `RcKeyInfo`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CellKey {
    /// `CellType::IntKey` key.
    Int(i64),
    /// `CellType::BinaryKey` key: one byte string per collated field.
    Bytes(Vec<Vec<u8>>),
}

/// One element of a supervalue's ordered cell set.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ListCell {
    /// The cell's key.
    pub key: CellKey,
    /// The cell's (opaque to this layer) payload.
    pub value: u64,
}

/// Per-field collating function, mirroring SQLite's `BINARY`/`NOCASE`/
/// `RTRIM` collations plus UTF-16 byte-order variants for `BinaryKey`
/// fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CollatingFunction {
    /// Plain byte-wise compare, UTF-8 encoded text.
    BinaryUtf8,
    /// Byte-wise compare of UTF-16BE-encoded text.
    BinaryUtf16Be,
    /// Byte-wise compare of UTF-16LE-encoded text (swapped to big-endian
    /// pairs before comparing).
    BinaryUtf16Le,
    /// Byte-wise compare after stripping trailing whitespace.
    Rtrim,
    /// ASCII case-insensitive compare.
    Nocase,
}

/// Ascending or descending sort order for one collated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SortDirection {
    /// Smaller values sort first.
    Asc,
    /// Larger values sort first.
    Desc,
}

/// Per-field collation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldCollation {
    /// Which bytewise comparison to use for this field.
    pub function: CollatingFunction,
    /// Sort direction for this field.
    pub direction: SortDirection,
}

/// Collation descriptor for a `BinaryKey` supervalue's composite cell keys:
/// one [`FieldCollation`] per field, applied positionally. "sqlite does not
/// include the KeyInfo in the key; it is supplied externally" — same here,
/// `RcKeyInfo` is grafted onto the owning `SuperValue` the first time a
/// caller supplies one, and is never overwritten afterwards (§4.4.7,
/// "sticky").
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RcKeyInfo {
    /// One collation rule per field of a `BinaryKey` cell key.
    pub fields: Vec<FieldCollation>,
}

fn compare_field(a: &[u8], b: &[u8], f: CollatingFunction) -> Ordering {
    match f {
        CollatingFunction::BinaryUtf8 => a.cmp(b),
        CollatingFunction::BinaryUtf16Be => a.cmp(b),
        CollatingFunction::BinaryUtf16Le => {
            let swap = |s: &[u8]| -> Vec<u8> {
                s.chunks(2)
                    .flat_map(|pair| {
                        if pair.len() == 2 {
                            vec![pair[1], pair[0]]
                        } else {
                            vec![pair[0]]
                        }
                    })
                    .collect()
            };
            swap(a).cmp(&swap(b))
        }
        CollatingFunction::Rtrim => {
            let trim = |s: &[u8]| {
                let end = s.iter().rposition(|b| !b.is_ascii_whitespace()).map(|i| i + 1).unwrap_or(0);
                &s[..end]
            };
            trim(a).cmp(trim(b))
        }
        CollatingFunction::Nocase => {
            let lower = |s: &[u8]| -> Vec<u8> { s.iter().map(|b| b.to_ascii_lowercase()).collect() };
            lower(a).cmp(&lower(b))
        }
    }
}

impl RcKeyInfo {
    /// Compares two composite byte-field keys field by field, stopping at
    /// the first field that differs. Fields beyond `self.fields.len()` fall
    /// back to `BinaryUtf8`/`Asc` (the original's behavior for keys
    /// compared before their full collation is known).
    pub fn compare(&self, a: &[Vec<u8>], b: &[Vec<u8>]) -> Ordering {
        for i in 0..a.len().max(b.len()) {
            let (fa, fb) = (a.get(i).map(|v| v.as_slice()).unwrap_or(&[]), b.get(i).map(|v| v.as_slice()).unwrap_or(&[]));
            let collation = self.fields.get(i).copied().unwrap_or(FieldCollation {
                function: CollatingFunction::BinaryUtf8,
                direction: SortDirection::Asc,
            });
            let ord = compare_field(fa, fb, collation.function);
            let ord = match collation.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

fn compare_keys(a: &CellKey, b: &CellKey, rki: Option<&RcKeyInfo>) -> Ordering {
    match (a, b) {
        (CellKey::Int(x), CellKey::Int(y)) => x.cmp(y),
        (CellKey::Bytes(x), CellKey::Bytes(y)) => match rki {
            Some(rki) => rki.compare(x, y),
            None => x.cmp(y),
        },
        _ => unreachable!("cell keys within one supervalue always share a CellType"),
    }
}

/// Structured record: `nattrs` fixed-width attribute slots plus an ordered
/// set of [`ListCell`]s.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SuperValue {
    /// Number of attribute slots.
    pub nattrs: u16,
    /// Interpretation of cell keys.
    pub celltype: CellType,
    /// Attribute values, `attrs.len() == nattrs`.
    pub attrs: Vec<u64>,
    /// Cells, kept sorted by key under `prki` (or numerically for
    /// `IntKey`).
    cells: Vec<ListCell>,
    /// Collation descriptor for `BinaryKey` cells. Grafted once, never
    /// overwritten (§4.4.7).
    pub prki: Option<RcKeyInfo>,
}

impl SuperValue {
    /// Builds an empty supervalue with `nattrs` zeroed attribute slots.
    pub fn new(nattrs: u16, celltype: CellType) -> Self {
        SuperValue {
            nattrs,
            celltype,
            attrs: vec![0u64; nattrs as usize],
            cells: Vec::new(),
            prki: None,
        }
    }

    /// Read-only view of the cells in sorted order.
    pub fn cells(&self) -> &[ListCell] {
        &self.cells
    }

    /// Sets attribute `idx` to `value`. Errors if `idx >= nattrs`.
    pub fn set_attr(&mut self, idx: u16, value: u64) -> Result<()> {
        if idx >= self.nattrs {
            return Err(Error::AttrOutOfRange {
                attr_id: idx,
                nattrs: self.nattrs,
            });
        }
        self.attrs[idx as usize] = value;
        Ok(())
    }

    /// Grafts a collation descriptor if none is set yet (sticky, §4.4.7).
    pub fn graft_prki(&mut self, prki: RcKeyInfo) {
        if self.prki.is_none() {
            self.prki = Some(prki);
        }
    }

    fn find_slot(&self, key: &CellKey) -> std::result::Result<usize, usize> {
        self.cells
            .binary_search_by(|probe| compare_keys(&probe.key, key, self.prki.as_ref()))
    }

    /// Inserts `cell`, replacing any existing cell with the same key
    /// (§4.4.7 `Add`). If `prki` is supplied and none is grafted yet, it is
    /// grafted onto this supervalue.
    pub fn insert_or_replace(&mut self, cell: ListCell, prki: Option<RcKeyInfo>) {
        if let Some(prki) = prki {
            self.graft_prki(prki);
        }
        match self.find_slot(&cell.key) {
            Ok(idx) => self.cells[idx] = cell,
            Err(idx) => self.cells.insert(idx, cell),
        }
    }

    /// Deletes every cell whose key falls within `[start, end]` as
    /// interpreted by `interval_type` (§6.4). `None` endpoints are treated
    /// as unbounded on that side regardless of `interval_type`.
    pub fn delete_range(&mut self, start: Option<&CellKey>, end: Option<&CellKey>, interval_type: IntervalType) {
        let prki = self.prki.clone();
        let cmp = |a: &CellKey, b: &CellKey| compare_keys(a, b, prki.as_ref());
        self.cells
            .retain(|c| !interval_type.contains(&c.key, start, end, &cmp));
    }

    /// True if a cell with `key` exists.
    pub fn contains_key(&self, key: &CellKey) -> bool {
        self.find_slot(key).is_ok()
    }
}
