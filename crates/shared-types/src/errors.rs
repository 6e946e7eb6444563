//! # Error Types
//!
//! Quantum-level errors shared by the handler, the sync layer and the runtime.

use thiserror::Error;

/// Ordering and validation failures for a quantum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantumError {
    /// Apex assignment would violate strict increment. Indicates a
    /// sequencing-discipline bug and halts the node.
    #[error("Out of order: expected apex {expected}, got {actual}")]
    OutOfOrder { expected: u64, actual: u64 },

    /// Apex gap or `prev_hash` discontinuity. The node must resynchronize
    /// from its last known-good apex; the quantum itself may be valid.
    #[error("Chain mismatch at apex {apex}: {reason}")]
    ChainMismatch { apex: u64, reason: String },

    /// The quantum content failed independent validation and must not be
    /// signed.
    #[error("Payload invalid at apex {apex}: {reason}")]
    PayloadInvalid { apex: u64, reason: String },
}

impl QuantumError {
    /// Whether the condition is recoverable by resynchronization.
    pub fn is_resync(&self) -> bool {
        matches!(self, QuantumError::ChainMismatch { .. })
    }
}

/// Failure to produce the canonical encoding of a message payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Encoding error: {0}")]
pub struct EncodingError(pub String);
