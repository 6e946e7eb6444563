//! # State Manager
//!
//! Holds the node's lifecycle state. Transitions go through `next_state`,
//! are published on a `watch` channel for local tasks, and on the event bus.

use crate::domain::errors::RoleError;
use crate::domain::lifecycle::{next_state, LifecycleEvent};
use crate::domain::role::RoleBehavior;
use shared_bus::{EventPublisher, LedgerEvent};
use shared_types::{NodeRole, NodeState};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Node lifecycle owner.
pub struct StateManager {
    behavior: Arc<dyn RoleBehavior>,
    state: watch::Sender<NodeState>,
    publisher: Arc<dyn EventPublisher>,
}

impl StateManager {
    pub fn new(behavior: Arc<dyn RoleBehavior>, publisher: Arc<dyn EventPublisher>) -> Self {
        let (state, _) = watch::channel(NodeState::Init);
        Self {
            behavior,
            state,
            publisher,
        }
    }

    pub fn role(&self) -> NodeRole {
        self.behavior.role()
    }

    pub fn behavior(&self) -> &Arc<dyn RoleBehavior> {
        &self.behavior
    }

    pub fn current(&self) -> NodeState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.current() == NodeState::Ready
    }

    pub fn is_failed(&self) -> bool {
        self.current().is_terminal()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<NodeState> {
        self.state.subscribe()
    }

    /// Apply `event`. Returns the resulting state.
    ///
    /// The check and the update happen under the watch channel's lock, so
    /// concurrent events cannot both transition from the same state.
    pub async fn handle(&self, event: LifecycleEvent) -> Result<NodeState, RoleError> {
        let mut outcome = Ok(NodeState::Init);
        let mut from = NodeState::Init;
        self.state.send_if_modified(|state| {
            from = *state;
            outcome = next_state(*state, event);
            match outcome {
                Ok(to) if to != *state => {
                    *state = to;
                    true
                }
                _ => false,
            }
        });

        let to = outcome?;
        if to != from {
            if to == NodeState::Failed {
                error!(role = %self.role(), "[qc-03] Node state {} → {}", from, to);
            } else {
                info!(role = %self.role(), "[qc-03] Node state {} → {}", from, to);
            }
            self.publisher
                .publish(LedgerEvent::NodeStateChanged { from, to })
                .await;
        }
        Ok(to)
    }

    /// Enter `Failed`, logging the cause.
    pub async fn fail(&self, reason: &str) -> NodeState {
        if !self.is_failed() {
            error!(role = %self.role(), "[qc-03] Fatal: {}", reason);
        }
        // Only errors when already failed, which is the goal.
        let _ = self.handle(LifecycleEvent::Fault).await;
        NodeState::Failed
    }
}
