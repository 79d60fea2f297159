//! Foundational types shared by every layer of gaiadb: container-object
//! identifiers, transaction identifiers, the hybrid-logical timestamp, the
//! stored-value model (`Value` / `SuperValue`), and the crate-wide error type.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coid;
pub mod error;
pub mod interval;
pub mod tid;
pub mod timestamp;
pub mod uniqueid;
pub mod value;

pub use coid::Coid;
pub use error::{Error, Result};
pub use interval::{BoundaryKind, IntervalType};
pub use tid::Tid;
pub use timestamp::Ts;
pub use uniqueid::UniqueId;
pub use value::{
    CellKey, CellType, CollatingFunction, FieldCollation, ListCell, RcKeyInfo, SortDirection,
    StoredValue, SuperValue,
};
