//! # Role Behavior
//!
//! Each role implements the role-specific parts of the sync and handshake
//! contract. The implementation is chosen once at startup.

use shared_types::{AuditorHandshakeResponse, Cursors, NodeRole, NodeState};
use std::sync::Arc;

/// Role-specific behavior.
pub trait RoleBehavior: Send + Sync {
    fn role(&self) -> NodeRole;

    /// Whether this node assigns apexes.
    fn can_sequence(&self) -> bool;

    /// Whether this node signs quanta it receives.
    fn signs_quanta(&self) -> bool;

    /// Whether recovery alone makes the node `Ready`. Otherwise it waits
    /// until sync reports it caught up.
    fn ready_after_recovery(&self) -> bool;

    /// Result cursor advertised to peers.
    fn advertised_result_cursor(&self, last_finalized: u64) -> u64;

    /// Answer a handshake challenge.
    fn handshake_response(
        &self,
        handshake_data: [u8; 32],
        last_apex: u64,
        last_finalized: u64,
        state: NodeState,
    ) -> AuditorHandshakeResponse {
        AuditorHandshakeResponse {
            handshake_data,
            quanta_cursor: last_apex,
            result_cursor: self.advertised_result_cursor(last_finalized),
            state,
        }
    }
}

/// The sole sequencer and signature aggregator.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrimeRole;

impl RoleBehavior for PrimeRole {
    fn role(&self) -> NodeRole {
        NodeRole::Prime
    }

    fn can_sequence(&self) -> bool {
        true
    }

    fn signs_quanta(&self) -> bool {
        false
    }

    fn ready_after_recovery(&self) -> bool {
        true
    }

    fn advertised_result_cursor(&self, _last_finalized: u64) -> u64 {
        Cursors::UNBOUNDED
    }
}

/// Validates, co-signs and replicates the Prime's quanta.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuditorRole;

impl RoleBehavior for AuditorRole {
    fn role(&self) -> NodeRole {
        NodeRole::Auditor
    }

    fn can_sequence(&self) -> bool {
        false
    }

    fn signs_quanta(&self) -> bool {
        true
    }

    fn ready_after_recovery(&self) -> bool {
        false
    }

    fn advertised_result_cursor(&self, last_finalized: u64) -> u64 {
        last_finalized
    }
}

/// Resolve a role into its behavior.
pub fn role_behavior(role: NodeRole) -> Arc<dyn RoleBehavior> {
    match role {
        NodeRole::Prime => Arc::new(PrimeRole),
        NodeRole::Auditor => Arc::new(AuditorRole),
    }
}
