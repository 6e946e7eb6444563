//! # Runtime Errors

use crate::container::config::ConfigError;
use qc_01_apex_log::{KVStoreError, LockError, LogError};
use qc_02_quantum_handler::HandlerError;
use qc_03_role_manager::RoleError;
use qc_04_quorum_sync::SyncError;
use shared_types::NodeRole;
use thiserror::Error;

/// Startup and wiring failures of the node runtime.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data directory lock: {0}")]
    Lock(#[from] LockError),

    #[error("Storage engine: {0}")]
    Storage(#[from] KVStoreError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Role(#[from] RoleError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The runtime was built for a node of the other role.
    #[error("Node is configured as {actual}, not {expected}")]
    WrongRole { expected: NodeRole, actual: NodeRole },

    /// A connection from a key this node does not expect.
    #[error("Unexpected peer {0}")]
    UnexpectedPeer(String),

    /// The node entered `Failed` during startup.
    #[error("Node failed during startup: {0}")]
    Failed(String),
}
