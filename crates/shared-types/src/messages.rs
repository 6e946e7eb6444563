//! # Wire Message Payloads
//!
//! Payloads carried inside `MessageEnvelope<NodeMessage>`.
//!
//! ## Flows
//!
//! ```text
//! Prime ──HandshakeRequest──────────────→ Auditor
//! Prime ←─AuditorHandshakeResponse─────── Auditor   (echo + cursors + state)
//! Prime ──SyncQuantaBatch───────────────→ Auditor   (catch-up and live)
//! Prime ←─QuantumSignaturesBatch───────── Auditor   (auditor's own signatures)
//! Prime ──QuantumSignaturesBatch────────→ Auditor   (finalized quorums)
//! Prime ←─SyncCursorReset──────────────── Auditor   (rewind after a gap)
//! Client ─QuantumRequest────────────────→ Prime
//! Client ←QuantumResult / QuantumFinalized Prime
//! ```

use crate::entities::{Hash, Quantum, QuantumRequest, SignatureSet};
use crate::state::NodeState;
use serde::{Deserialize, Serialize};

/// Random challenge opening a node connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Data the responder must echo back unchanged.
    pub handshake_data: [u8; 32],
}

/// Responder's answer to a `HandshakeRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorHandshakeResponse {
    /// Echo of the request data.
    pub handshake_data: [u8; 32],
    /// Last apex the responder holds.
    pub quanta_cursor: u64,
    /// Last apex with a durable signature quorum, or `Cursors::UNBOUNDED`
    /// when the responder is a Prime.
    pub result_cursor: u64,
    /// Responder's lifecycle state.
    pub state: NodeState,
}

/// Request to rewind the sender's cursors on the remote worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursorReset {
    /// New quantum cursor, if it should change.
    pub quantum_cursor: Option<u64>,
    /// New result cursor, if it should change.
    pub result_cursor: Option<u64>,
}

/// One quantum in a sync batch, with the signatures known at send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQuantaBatchItem {
    pub quantum: Quantum,
    pub signatures: SignatureSet,
}

/// Contiguous, ascending run of quanta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQuantaBatch {
    pub items: Vec<SyncQuantaBatchItem>,
    /// Sender's last added apex when the batch was cut.
    pub last_known_apex: u64,
}

/// Signatures collected for one apex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumSignatures {
    pub apex: u64,
    pub signatures: SignatureSet,
}

/// Ascending run of per-apex signature sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumSignaturesBatch {
    pub items: Vec<QuantumSignatures>,
}

/// Unsolicited lifecycle change of the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub state: NodeState,
}

/// Outcome of a client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    /// Sequenced and durable; finality follows as a notification.
    Accepted,
    /// Not sequenced.
    Rejected { reason: String },
}

/// Immediate response to a `QuantumRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumResult {
    pub request_id: u64,
    /// Assigned apex when accepted.
    pub apex: Option<u64>,
    pub status: ResultStatus,
}

/// Notification sent to the origin client once an apex reaches quorum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumFinalized {
    pub request_id: u64,
    pub apex: u64,
    pub quantum_hash: Hash,
}

/// Every payload exchanged between nodes and clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeMessage {
    HandshakeRequest(HandshakeRequest),
    AuditorHandshakeResponse(AuditorHandshakeResponse),
    SyncCursorReset(SyncCursorReset),
    SyncQuantaBatch(SyncQuantaBatch),
    QuantumSignaturesBatch(QuantumSignaturesBatch),
    StateUpdate(StateUpdate),
    QuantumRequest(QuantumRequest),
    QuantumResult(QuantumResult),
    QuantumFinalized(QuantumFinalized),
}

impl NodeMessage {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeMessage::HandshakeRequest(_) => "handshake_request",
            NodeMessage::AuditorHandshakeResponse(_) => "handshake_response",
            NodeMessage::SyncCursorReset(_) => "cursor_reset",
            NodeMessage::SyncQuantaBatch(_) => "quanta_batch",
            NodeMessage::QuantumSignaturesBatch(_) => "signatures_batch",
            NodeMessage::StateUpdate(_) => "state_update",
            NodeMessage::QuantumRequest(_) => "quantum_request",
            NodeMessage::QuantumResult(_) => "quantum_result",
            NodeMessage::QuantumFinalized(_) => "quantum_finalized",
        }
    }
}
