//! Crate-wide error type (§7). One variant per error kind surfaced at the
//! core boundary, following the teacher's `StrataError` shape: a flat
//! `thiserror` enum plus small predicate helpers for the handlers in
//! `gaia-server` to use when deciding how to respond to an RPC.

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the core storage boundary (§7).
#[derive(Debug, Error)]
pub enum Error {
    /// Read timestamp precedes all available checkpoints for the COid.
    #[error("read at a timestamp older than every retained checkpoint")]
    TooOldVersion,

    /// Read would observe uncommitted data and the caller disallowed
    /// deferral.
    #[error("read would observe pending (uncommitted) data")]
    PendingData,

    /// A checkpoint was followed by an entry that would violate the
    /// checkpoint-then-deltas invariant. Logged and downgraded to
    /// `TooOldVersion` before it reaches a client (§7 propagation policy).
    #[error("log entries violate the checkpoint/delta ordering invariant")]
    CorruptedLog,

    /// Operation mismatched with the stored variant (e.g. `ListAdd` on a
    /// plain `Value`).
    #[error("operation requires a {expected} but the stored object is a {actual}")]
    WrongType {
        /// The variant the operation required.
        expected: &'static str,
        /// The variant actually stored.
        actual: &'static str,
    },

    /// `AttrSet` with an attribute id outside `0..nattrs`.
    #[error("attribute id {attr_id} is out of range (nattrs = {nattrs})")]
    AttrOutOfRange {
        /// The attribute id that was requested.
        attr_id: u16,
        /// The number of attribute slots actually present.
        nattrs: u16,
    },

    /// Allocation failure while packing a record for the wire or the WAL.
    #[error("out of memory packing a record")]
    NoMemory,

    /// I/O error from the WAL or disk object store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure to (de)serialize a wire or WAL payload.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Data read back from disk failed its checksum.
    #[error("checksum mismatch reading {what}")]
    ChecksumMismatch {
        /// What was being read (a WAL record, a checkpoint file, ...).
        what: &'static str,
    },

    /// Malformed node configuration file (§6.5).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Prepare detected a conflict with another prepared-or-committed
    /// transaction on a touched COid; the 2PC participant must vote NO.
    #[error("conflict detected at prepare, voting NO")]
    VoteNo,
}

impl Error {
    /// True for errors that are safe to retry unmodified (the transport or
    /// the caller resubmits the same request later).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PendingData)
    }

    /// True for errors that should be converted to a numeric RPC status
    /// rather than closing the connection (§7 propagation policy).
    pub fn is_client_status(&self) -> bool {
        matches!(
            self,
            Error::PendingData
                | Error::TooOldVersion
                | Error::WrongType { .. }
                | Error::AttrOutOfRange { .. }
                | Error::NoMemory
                | Error::VoteNo
        )
    }

    /// True if prepare should respond NO for this error (§7 `VoteNo`
    /// propagation: carried directly in the Prepare response).
    pub fn is_vote_no(&self) -> bool {
        matches!(self, Error::VoteNo)
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_data_is_retryable() {
        assert!(Error::PendingData.is_retryable());
        assert!(!Error::TooOldVersion.is_retryable());
    }

    #[test]
    fn corrupted_log_is_not_a_client_status() {
        assert!(!Error::CorruptedLog.is_client_status());
    }
}
