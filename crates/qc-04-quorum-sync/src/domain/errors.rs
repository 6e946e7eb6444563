//! # Domain Errors

use shared_types::PublicKey;
use std::fmt::Display;
use thiserror::Error;

/// Synchronization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The source could not serve a contiguous run. Log corruption or a
    /// pruned range; never retried.
    #[error("Chain mismatch at apex {apex}: {reason}")]
    ChainMismatch { apex: u64, reason: String },

    /// The requested start predates retained history.
    #[error("Apex {requested} predates retained history (first available {first_available})")]
    HistoryPruned { requested: u64, first_available: u64 },

    /// Storage failure behind the sync source.
    #[error("Sync source failure: {0}")]
    Source(String),

    /// The transport refused or failed a send.
    #[error("Send to {peer} failed: {reason}")]
    Transport { peer: String, reason: String },

    /// The connection is closed.
    #[error("Connection to {peer} closed")]
    Closed { peer: String },

    /// The handshake echo does not match the challenge.
    #[error("Handshake echo does not match the challenge")]
    HandshakeMismatch,

    /// A handshake response arrived without an outstanding challenge.
    #[error("No handshake pending for {peer}")]
    NoPendingHandshake { peer: String },

    /// The peer reports more quanta than this node holds.
    #[error("Peer {peer} is ahead of the local log ({remote} > {local})")]
    PeerAhead { peer: String, remote: u64, local: u64 },

    /// No connection is registered for the key.
    #[error("Unknown peer {peer}")]
    UnknownPeer { peer: String },

    /// The envelope could not be signed.
    #[error("Envelope encoding failed: {0}")]
    Encoding(String),
}

impl SyncError {
    pub fn transport(peer: &PublicKey, reason: impl Display) -> Self {
        SyncError::Transport {
            peer: hex::encode(peer),
            reason: reason.to_string(),
        }
    }

    pub fn closed(peer: &PublicKey) -> Self {
        SyncError::Closed {
            peer: hex::encode(peer),
        }
    }

    pub fn unknown_peer(peer: &PublicKey) -> Self {
        SyncError::UnknownPeer {
            peer: hex::encode(peer),
        }
    }

    /// Whether the error ends the connection rather than a single operation.
    pub fn closes_connection(&self) -> bool {
        !matches!(
            self,
            SyncError::UnknownPeer { .. } | SyncError::NoPendingHandshake { .. }
        )
    }
}
