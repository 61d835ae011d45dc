//! # Ledger Error Types

use govgate_core::CanonicalizationError;
use thiserror::Error;

/// Errors from ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Hash or link mismatch. Fatal: the ledger refuses to serve until an
    /// operator resolves it.
    #[error("chain integrity failed at index {index}: {reason}")]
    ChainIntegrity {
        /// First index whose hash or linkage does not verify.
        index: u64,
        /// What failed.
        reason: String,
    },

    /// Durable write failed. The entry must be treated as not recorded.
    #[error("ledger write failed: {0}")]
    Write(#[source] std::io::Error),

    /// An earlier durable write failed. Storage may no longer match the
    /// in-memory chain, so appends are refused until the ledger is reopened.
    #[error("ledger writer halted after a failed write; reopen the ledger to resume")]
    WriterHalted,

    /// Durable write did not complete within the configured bound.
    #[error("ledger write timed out after {0} ms")]
    WriteTimeout(u64),

    /// Reading durable storage failed.
    #[error("ledger read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Storage ends with a partial or malformed line from an interrupted
    /// write. The ledger is not verified until the tail is truncated.
    #[error("ledger storage ends with an incomplete write at line {line}")]
    IncompleteWrite {
        /// 1-based line number of the incomplete record.
        line: usize,
    },

    /// Entry data could not be canonicalized (e.g. contains floats).
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An external backend rejected or failed a request.
    #[error("ledger backend {backend} failed: {reason}")]
    Backend {
        /// Backend name.
        backend: String,
        /// Failure description.
        reason: String,
    },
}

impl LedgerError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChainIntegrity { .. } => "CHAIN_INTEGRITY_FAILED",
            Self::Write(_)
            | Self::WriterHalted
            | Self::WriteTimeout(_)
            | Self::Canonicalization(_) => "LEDGER_WRITE_FAILED",
            Self::Read(_) => "LEDGER_READ_FAILED",
            Self::IncompleteWrite { .. } => "LEDGER_INCOMPLETE_WRITE",
            Self::Serialization(_) => "LEDGER_SERIALIZATION_FAILED",
            Self::Backend { .. } => "LEDGER_BACKEND_FAILED",
        }
    }
}
