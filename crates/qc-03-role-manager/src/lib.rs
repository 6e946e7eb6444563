//! # Role / State Manager (qc-03)
//!
//! Node-wide role and lifecycle gating.
//!
//! - The role (`Prime` or `Auditor`) is fixed at startup and resolved once
//!   into a `RoleBehavior`; call sites never branch on the role themselves.
//! - The lifecycle is a deterministic state machine driven by events.
//! - The Prime tracks each connected auditor's reported state to decide
//!   which auditors count toward a meaningful quorum.
//!
//! ## Lifecycle
//!
//! ```text
//! [Init] ──Start──→ [Rising] ──CaughtUp──→ [Ready]
//!                      ↑                      │
//!                      └────Disconnected──────┘
//!
//! any ──Fault──→ [Failed]   (terminal: stop sequencing and signing)
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod service;

pub use domain::errors::RoleError;
pub use domain::lifecycle::{next_state, LifecycleEvent};
pub use domain::role::{role_behavior, AuditorRole, PrimeRole, RoleBehavior};
pub use service::registry::AuditorRegistry;
pub use service::state_manager::StateManager;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
