//! # Inbound Ports (Driving Ports)

use crate::domain::errors::HandlerError;
use async_trait::async_trait;
use shared_types::{Quantum, QuantumRequest, SignatureSet};

/// Result of merging a signature batch for one apex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureOutcome {
    pub apex: u64,
    /// Signatures that verified and came from known auditors.
    pub accepted: usize,
    /// Signatures dropped: unknown signer or failed verification.
    pub rejected: usize,
    /// Signers stored for the apex after the merge.
    pub total: usize,
    /// The apex has reached quorum.
    pub finalized: bool,
    /// This call is the one that reached quorum.
    pub newly_finalized: bool,
}

/// Quantum Handler API.
#[async_trait]
pub trait QuantumHandlerApi: Send + Sync {
    /// Assign the next apex to `request`, chain it and persist it.
    ///
    /// Prime only. Concurrent calls are serialized; each gets a distinct
    /// apex.
    async fn sequence(&self, request: QuantumRequest) -> Result<Quantum, HandlerError>;

    /// Check `quantum` against the local tip and recompute its digests.
    fn validate(&self, quantum: &Quantum) -> Result<(), HandlerError>;

    /// Validate and persist a quantum received from the Prime.
    ///
    /// Auditor only.
    async fn apply(&self, quantum: Quantum, signatures: SignatureSet)
        -> Result<(), HandlerError>;

    /// Verify and merge signatures over the stored quantum at `apex`.
    async fn add_signatures(
        &self,
        apex: u64,
        signatures: SignatureSet,
    ) -> Result<SignatureOutcome, HandlerError>;

    /// Latest apex durably held by this node.
    fn last_added_apex(&self) -> u64;

    /// Apex most recently assigned or applied, including one being persisted.
    fn current_apex(&self) -> u64;

    /// Highest apex such that every apex up to it has reached quorum.
    fn last_finalized_apex(&self) -> u64;
}
