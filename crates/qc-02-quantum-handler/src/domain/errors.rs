//! # Domain Errors

use shared_types::QuantumError;
use thiserror::Error;

/// Failures reported by a `QuantumStore`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The write or read did not happen; the node may retry.
    #[error("Storage failure: {0}")]
    Failure(String),

    /// The durable log cannot be trusted.
    #[error("Corrupt log: {0}")]
    Corrupt(String),
}

/// Errors returned by the Quantum Handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Ordering or validation failure of a quantum.
    #[error(transparent)]
    Quantum(#[from] QuantumError),

    /// `sequence` called on an Auditor.
    #[error("Only the Prime sequences quanta")]
    NotPrime,

    /// `apply` called on the Prime.
    #[error("Only Auditors apply quanta received from the Prime")]
    NotAuditor,

    /// Signatures for an apex this node does not hold.
    #[error("Apex {apex} is not stored")]
    UnknownApex { apex: u64 },

    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HandlerError {
    /// Whether the node must stop sequencing and signing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HandlerError::Quantum(QuantumError::OutOfOrder { .. })
                | HandlerError::Store(StoreError::Corrupt(_))
        )
    }

    /// Whether the node should resynchronize from its last good apex.
    pub fn is_resync(&self) -> bool {
        matches!(self, HandlerError::Quantum(e) if e.is_resync())
    }
}
