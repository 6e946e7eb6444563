//! # Outbound Ports (Driven Ports)
//!
//! Production:
//! - `PeerTransport`: loopback links (node-runtime/adapters/loopback.rs)
//! - `SyncSource`: Apex Log plus handler finality (node-runtime/adapters/log_store.rs)

use crate::domain::errors::SyncError;
use async_trait::async_trait;
use shared_types::{MessageEnvelope, NodeMessage, PublicKey, QuantumSignatures, SyncQuantaBatchItem};

/// One connection to a remote node.
///
/// Implementations allow a single outstanding write at a time so frames
/// never interleave.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Identity of the remote node.
    fn peer_key(&self) -> PublicKey;

    /// Deliver one envelope.
    async fn send(&self, envelope: MessageEnvelope<NodeMessage>) -> Result<(), SyncError>;

    /// Close the connection. In-flight sends fail.
    async fn close(&self, reason: &str);
}

/// Read side of the local log as seen by sync workers.
pub trait SyncSource: Send + Sync {
    /// Latest durable apex.
    fn last_added_apex(&self) -> u64;

    /// Highest apex such that every apex up to it has reached quorum.
    fn last_finalized_apex(&self) -> u64;

    /// Up to `max` quanta from `from` inclusive, ascending.
    fn load_quanta(&self, from: u64, max: usize) -> Result<Vec<SyncQuantaBatchItem>, SyncError>;

    /// Up to `max` signature sets from `from` inclusive, ascending.
    fn load_signatures(&self, from: u64, max: usize) -> Result<Vec<QuantumSignatures>, SyncError>;
}
