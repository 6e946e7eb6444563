//! # Lifecycle State Machine
//!
//! Pure transition function: `(state, event) → state`.

use crate::domain::errors::RoleError;
use shared_types::NodeState;

/// Inputs that move a node through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Process started loading persisted state.
    Start,
    /// Recovery finished and the node holds everything its source holds.
    CaughtUp,
    /// Lost the connection needed to stay current, or must resync.
    Disconnected,
    /// Unrecoverable log or consensus inconsistency.
    Fault,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Start => "start",
            LifecycleEvent::CaughtUp => "caught_up",
            LifecycleEvent::Disconnected => "disconnected",
            LifecycleEvent::Fault => "fault",
        }
    }
}

/// Next state for `event` in `state`.
///
/// Repeating the event that led to the current state is a no-op.
pub fn next_state(state: NodeState, event: LifecycleEvent) -> Result<NodeState, RoleError> {
    use LifecycleEvent::*;
    use NodeState::*;

    match (state, event) {
        (Failed, _) => Err(RoleError::Terminal),
        (_, Fault) => Ok(Failed),

        (Init, Start) => Ok(Rising),

        (Rising, CaughtUp) | (Ready, CaughtUp) => Ok(Ready),
        (Rising, Disconnected) | (Ready, Disconnected) => Ok(Rising),
        (Rising, Start) => Ok(Rising),

        (from, event) => Err(RoleError::InvalidTransition {
            from,
            event: event.name(),
        }),
    }
}
