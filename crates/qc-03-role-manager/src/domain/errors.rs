//! # Domain Errors

use shared_types::NodeState;
use thiserror::Error;

/// Role and lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    /// The event is not valid in the current state.
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: NodeState, event: &'static str },

    /// The node has failed and accepts no further transitions.
    #[error("Node has failed and requires operator intervention")]
    Terminal,

    /// A state report from a key outside the configured auditor set.
    #[error("Unknown auditor {key}")]
    UnknownAuditor { key: String },
}
