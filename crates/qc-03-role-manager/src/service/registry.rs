//! # Auditor Registry
//!
//! The Prime's record of each known auditor's self-reported state. Only
//! `Ready` auditors are quorum-eligible: an auditor still rising cannot sign
//! new quanta in time to matter.

use crate::domain::errors::RoleError;
use parking_lot::RwLock;
use shared_bus::{EventPublisher, LedgerEvent};
use shared_types::{NodeState, PublicKey, QuorumThreshold};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Known auditors and their reported states.
pub struct AuditorRegistry {
    known: HashSet<PublicKey>,
    threshold: QuorumThreshold,
    states: RwLock<HashMap<PublicKey, NodeState>>,
    publisher: Arc<dyn EventPublisher>,
}

impl AuditorRegistry {
    pub fn new(
        known: impl IntoIterator<Item = PublicKey>,
        threshold: QuorumThreshold,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            known: known.into_iter().collect(),
            threshold,
            states: RwLock::new(HashMap::new()),
            publisher,
        }
    }

    pub fn is_known(&self, key: &PublicKey) -> bool {
        self.known.contains(key)
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Record an auditor's reported state. Returns whether it changed.
    ///
    /// # Errors
    ///
    /// `UnknownAuditor` for keys outside the configured set.
    pub async fn update(&self, key: PublicKey, state: NodeState) -> Result<bool, RoleError> {
        if !self.is_known(&key) {
            return Err(RoleError::UnknownAuditor {
                key: hex::encode(key),
            });
        }
        let changed = self.states.write().insert(key, state) != Some(state);
        if changed {
            debug!(auditor = %hex::encode(key), %state, "[qc-03] Auditor state updated");
            self.publisher
                .publish(LedgerEvent::AuditorStateChanged {
                    auditor: key,
                    state,
                })
                .await;
        }
        Ok(changed)
    }

    /// Forget a disconnected auditor's state.
    pub fn remove(&self, key: &PublicKey) -> Option<NodeState> {
        self.states.write().remove(key)
    }

    pub fn state_of(&self, key: &PublicKey) -> Option<NodeState> {
        self.states.read().get(key).copied()
    }

    pub fn is_quorum_eligible(&self, key: &PublicKey) -> bool {
        self.state_of(key) == Some(NodeState::Ready)
    }

    pub fn ready_count(&self) -> usize {
        self.states
            .read()
            .values()
            .filter(|s| **s == NodeState::Ready)
            .count()
    }

    /// Whether enough auditors are ready to finalize new quanta.
    pub fn has_ready_quorum(&self) -> bool {
        self.ready_count() >= self.threshold.required(self.known.len()).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::InMemoryEventBus;

    fn registry(threshold: QuorumThreshold) -> AuditorRegistry {
        AuditorRegistry::new(
            [[1; 32], [2; 32], [3; 32]],
            threshold,
            Arc::new(InMemoryEventBus::new()),
        )
    }

    #[tokio::test]
    async fn test_ready_auditors_are_eligible() {
        let registry = registry(QuorumThreshold::Majority);

        assert!(registry.update([1; 32], NodeState::Rising).await.unwrap());
        assert!(!registry.is_quorum_eligible(&[1; 32]));

        registry.update([1; 32], NodeState::Ready).await.unwrap();
        assert!(registry.is_quorum_eligible(&[1; 32]));
        assert!(!registry.has_ready_quorum());

        registry.update([2; 32], NodeState::Ready).await.unwrap();
        assert_eq!(registry.ready_count(), 2);
        assert!(registry.has_ready_quorum());
    }

    #[tokio::test]
    async fn test_repeated_report_is_not_a_change() {
        let registry = registry(QuorumThreshold::Majority);
        assert!(registry.update([1; 32], NodeState::Ready).await.unwrap());
        assert!(!registry.update([1; 32], NodeState::Ready).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_auditor_rejected() {
        let registry = registry(QuorumThreshold::Count(1));
        assert!(matches!(
            registry.update([9; 32], NodeState::Ready).await,
            Err(RoleError::UnknownAuditor { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_on_disconnect() {
        let registry = registry(QuorumThreshold::Count(1));
        registry.update([3; 32], NodeState::Ready).await.unwrap();
        assert!(registry.has_ready_quorum());

        assert_eq!(registry.remove(&[3; 32]), Some(NodeState::Ready));
        assert!(!registry.has_ready_quorum());
        assert_eq!(registry.state_of(&[3; 32]), None);
    }
}
