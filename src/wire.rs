//! RPC request/response payloads (§6.1, §6.2). Marshalled with `rmp_serde`,
//! the same wire serialization `gaia-wal` uses for its on-disk records —
//! one codec for the whole workspace rather than a second ad hoc format.

use gaia_core::{CellKey, Coid, Error, ListCell, RcKeyInfo, Result, SuperValue, Tid, Ts};
use serde::{Deserialize, Serialize};

/// Encodes `value` with `rmp_serde`, mapping failures onto the shared error
/// type.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(value)?)
}

/// Decodes `bytes` as a `T`, mapping failures onto the shared error type.
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// A wire-encodable interval boundary, since [`gaia_core::IntervalType`]
/// itself is plain-byte-encoded per §6.4 rather than `serde`-derived.
fn encode_interval(interval: gaia_core::IntervalType) -> u8 {
    interval.encode()
}

fn decode_interval(raw: u8) -> Result<gaia_core::IntervalType> {
    gaia_core::IntervalType::decode(raw).ok_or_else(|| Error::Serialization(format!("bad interval byte {raw}")))
}

/// RPC #2 `Write` request: overwrite `coid` with a plain value.
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteReq {
    /// Owning transaction.
    pub tid: Tid,
    /// Target object.
    pub coid: Coid,
    /// Subtransaction level active for this op.
    pub level: i16,
    /// New value.
    pub value: Vec<u8>,
}

/// RPC #3 `Read` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadReq {
    /// Target object.
    pub coid: Coid,
    /// Snapshot timestamp to read at (`Ts::illegal()` for "latest safe").
    pub ts: Ts,
    /// If true, a read that would observe pending data suspends and is
    /// retried once the blocking transaction resolves, rather than failing
    /// immediately with `PENDING_DATA` (§4.8 Read/Fullread).
    pub allow_defer: bool,
}

/// RPC #3/#5 read response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadResp {
    /// The timestamp actually observed.
    pub read_ts: Ts,
    /// Raw value bytes (only meaningful for #3 `Read` against a
    /// `Value`-typed COid).
    pub value: Vec<u8>,
}

/// RPC #4 `FullWrite` request: overwrite `coid` with a supervalue.
#[derive(Debug, Serialize, Deserialize)]
pub struct FullWriteReq {
    /// Owning transaction.
    pub tid: Tid,
    /// Target object.
    pub coid: Coid,
    /// Subtransaction level active for this op.
    pub level: i16,
    /// New supervalue.
    pub sv: SuperValue,
}

/// RPC #5 `FullRead` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct FullReadReq {
    /// Target object.
    pub coid: Coid,
    /// Snapshot timestamp to read at.
    pub ts: Ts,
    /// See [`ReadReq::allow_defer`].
    pub allow_defer: bool,
}

/// RPC #5 response.
#[derive(Debug, Serialize, Deserialize)]
pub struct FullReadResp {
    /// The timestamp actually observed.
    pub read_ts: Ts,
    /// The materialized supervalue.
    pub sv: SuperValue,
}

/// RPC #6 `ListAdd` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListAddReq {
    /// Owning transaction.
    pub tid: Tid,
    /// Target object.
    pub coid: Coid,
    /// Subtransaction level active for this op.
    pub level: i16,
    /// Cell to insert or replace.
    pub cell: ListCell,
    /// Collation descriptor to graft if none is set yet (§4.4.7, sticky).
    pub prki: Option<RcKeyInfo>,
}

/// RPC #7 `ListDelRange` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListDelRangeReq {
    /// Owning transaction.
    pub tid: Tid,
    /// Target object.
    pub coid: Coid,
    /// Subtransaction level active for this op.
    pub level: i16,
    /// Inclusive/exclusive/unbounded start key.
    pub start: Option<CellKey>,
    /// Inclusive/exclusive/unbounded end key.
    pub end: Option<CellKey>,
    /// §6.4 single-byte boundary encoding.
    pub interval_byte: u8,
}

impl ListDelRangeReq {
    /// Decodes [`ListDelRangeReq::interval_byte`] into a usable
    /// [`gaia_core::IntervalType`].
    pub fn interval(&self) -> Result<gaia_core::IntervalType> {
        decode_interval(self.interval_byte)
    }
}

/// Builds the wire `interval_byte` for a [`ListDelRangeReq`] from a decoded
/// [`gaia_core::IntervalType`] (used by tests and any future client-side
/// helper library).
pub fn interval_byte(interval: gaia_core::IntervalType) -> u8 {
    encode_interval(interval)
}

/// RPC #8 `AttrSet` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct AttrSetReq {
    /// Owning transaction.
    pub tid: Tid,
    /// Target object.
    pub coid: Coid,
    /// Subtransaction level active for this op.
    pub level: i16,
    /// Attribute index.
    pub attr_id: u16,
    /// New value.
    pub value: u64,
}

/// RPC #9 `Prepare` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct PrepareReq {
    /// Transaction to prepare.
    pub tid: Tid,
    /// The transaction's own read snapshot (for the §4.8 step-3 conflict
    /// window: committed entries newer than this are checked).
    pub read_ts: Ts,
    /// Client-proposed commit timestamp.
    pub proposed_ts: Ts,
}

/// RPC #9 response.
#[derive(Debug, Serialize, Deserialize)]
pub struct PrepareResp {
    /// `true` for YES, `false` for NO.
    pub vote: bool,
    /// The (possibly advanced) timestamp to commit at; only meaningful when
    /// `vote` is `true`. The client `catchup`s its clock to this value.
    pub final_ts: Ts,
}

/// RPC #10 `Commit` request: also covers the abort path (§4.8 "Abort RPC /
/// abort path of Commit" — the spec's RPC table has no separate Abort
/// entry, so this handler dispatches on `outcome`).
#[derive(Debug, Serialize, Deserialize)]
pub struct CommitReq {
    /// Transaction to finish.
    pub tid: Tid,
    /// Commit or abort, with the commit timestamp in the former case.
    pub outcome: CommitOutcome,
}

/// Outcome carried by a [`CommitReq`].
#[derive(Debug, Serialize, Deserialize)]
pub enum CommitOutcome {
    /// Finalize as committed at this timestamp.
    Commit(Ts),
    /// Finalize as aborted.
    Abort,
}

/// RPC #11 `Subtrans` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubtransReq {
    /// Transaction being adjusted.
    pub tid: Tid,
    /// If set, discards every item recorded deeper than this level.
    pub abort_level: Option<i16>,
    /// If set, folds every item recorded deeper than this level down to it.
    pub release_level: Option<i16>,
}

/// RPC #1 `GetStatus` response (§2 supplemented feature).
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResp {
    /// Number of COids currently resident in memory.
    pub resident_coids: usize,
    /// Number of in-flight (not yet committed/aborted) transactions.
    pub pending_txs: usize,
    /// Number of split requests currently queued.
    pub split_queue_depth: usize,
    /// Whether the WAL writer thread is believed alive (best-effort: this
    /// node has not yet observed a broken-pipe error writing to it).
    pub wal_alive: bool,
}

/// RPC #14 `FlushFile` / #15 `LoadFile` request (§6.6 `save_individual`/
/// `load_individual`, and the RPC equivalents in §6.1).
#[derive(Debug, Serialize, Deserialize)]
pub struct CoidFileReq {
    /// The COid to flush to (or load from) disk.
    pub coid: Coid,
}

/// RPC #16 `GetRowid` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetRowidReq {
    /// Container id to allocate the next rowid for.
    pub cid: u64,
}

/// RPC #16 response.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetRowidResp {
    /// Newly allocated, previously unused rowid for this `cid`.
    pub rowid: i64,
}
