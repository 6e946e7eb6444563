//! # Outbound Ports (Driven Ports)
//!
//! Production: `LogStore` over the Apex Log (node-runtime/adapters/log_store.rs)

use crate::domain::errors::StoreError;
use shared_types::{Hash, Quantum, QuantumRequest, SignatureSet};

/// Durable storage of chained quanta.
pub trait QuantumStore: Send + Sync {
    /// Last persisted apex, `0` when empty.
    fn last_apex(&self) -> Result<u64, StoreError>;

    /// Stored quantum and signatures at `apex`.
    fn load_quantum(&self, apex: u64) -> Result<Option<(Quantum, SignatureSet)>, StoreError>;

    /// Atomically persist `quantum` with its signatures.
    fn persist(&self, quantum: &Quantum, signatures: &SignatureSet) -> Result<(), StoreError>;

    /// Merge signatures into the stored record. Returns the merged set.
    fn add_signatures(&self, apex: u64, signatures: &SignatureSet)
        -> Result<SignatureSet, StoreError>;
}

/// Business payload interpretation, external to the core.
pub trait PayloadProcessor: Send + Sync {
    /// Digest committing to the request content.
    fn payload_hash(&self, request: &QuantumRequest) -> Hash;

    /// Digest of the side effects of applying `request` at `apex`.
    ///
    /// `Err` carries the reason the request is not acceptable.
    fn effects_proof(&self, request: &QuantumRequest, apex: u64) -> Result<Vec<u8>, String>;
}

/// Wall clock, injectable for tests.
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}
