//! # Domain Errors
//!
//! Error types for the Apex Log.

use std::fmt;
use thiserror::Error;

/// Errors raised by a `KeyValueStore` implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KVStoreError {
    /// Underlying I/O failed.
    IOError { message: String },
    /// The engine reported damaged data.
    CorruptionError { message: String },
    /// Key not present where one was required.
    NotFound,
}

impl fmt::Display for KVStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KVStoreError::IOError { message } => write!(f, "I/O error: {}", message),
            KVStoreError::CorruptionError { message } => write!(f, "Corruption: {}", message),
            KVStoreError::NotFound => write!(f, "Key not found"),
        }
    }
}

impl std::error::Error for KVStoreError {}

/// Errors returned by the Apex Log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    /// Storage engine failure.
    #[error("Storage error: {0}")]
    Store(#[from] KVStoreError),

    /// A record could not be encoded or decoded.
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// A record's CRC32 trailer did not match its body.
    #[error("Checksum mismatch for key {key}")]
    ChecksumMismatch { key: String },

    /// `append` was called with an apex other than `last + 1`.
    #[error("Out of order append: expected apex {expected}, got {actual}")]
    OutOfOrder { expected: u64, actual: u64 },

    /// `prev_hash` does not match the stored predecessor.
    #[error("Chain mismatch at apex {apex}: {reason}")]
    ChainMismatch { apex: u64, reason: String },

    /// A range read hit a hole in the stored chain.
    #[error("Missing apex {apex} in stored range")]
    MissingApex { apex: u64 },

    /// The requested start lies before the retained history.
    #[error("History pruned: requested apex {requested}, first available {first_available}")]
    HistoryPruned { requested: u64, first_available: u64 },

    /// No record exists for the apex.
    #[error("Apex {apex} not found")]
    NotFound { apex: u64 },

    /// The durable log failed its own continuity check. Requires operator
    /// intervention.
    #[error("Corrupt log: {reason}")]
    CorruptLog { reason: String },
}

impl LogError {
    /// Whether the error means the stored ledger cannot be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LogError::CorruptLog { .. } | LogError::ChecksumMismatch { .. }
        )
    }

    pub(crate) fn encoding(err: impl fmt::Display) -> Self {
        LogError::Encoding {
            message: err.to_string(),
        }
    }
}
