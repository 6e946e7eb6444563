//! # Node Roles and Lifecycle States

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role fixed for the lifetime of a node process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Sole sequencer and signature aggregator.
    Prime,
    /// Validates and co-signs every quantum, keeps a durable replica.
    Auditor,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Prime => write!(f, "prime"),
            NodeRole::Auditor => write!(f, "auditor"),
        }
    }
}

/// Node lifecycle state.
///
/// ```text
/// [Init] ──→ [Rising] ⇄ [Ready]
///    │           │          │
///    └───────────┴──────────┴──→ [Failed] (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeState {
    /// Process started, nothing loaded yet.
    #[default]
    Init,
    /// Loading persisted state or catching up with peers.
    Rising,
    /// Caught up; accepting new quanta and sync traffic.
    Ready,
    /// Unrecoverable log or consensus inconsistency.
    Failed,
}

impl NodeState {
    /// Whether the state can never be left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Failed)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Init => "init",
            NodeState::Rising => "rising",
            NodeState::Ready => "ready",
            NodeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Transport-level connection state, set by the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Socket open, handshake not yet confirmed.
    #[default]
    Connected,
    /// Handshake confirmed; sync traffic allowed.
    Ready,
    /// Closed by either side.
    Closed,
}
