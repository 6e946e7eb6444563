//! # Shared Bus - Event Bus for Inter-Subsystem Communication
//!
//! Replaces implicit event handlers with an explicit publish/subscribe
//! channel. The Quantum Handler publishes after persistence; sync workers,
//! the client notifier and the runtime subscribe.
//!
//! ```text
//! ┌──────────────────┐                    ┌──────────────────┐
//! │ Quantum Handler  │                    │ Sync Workers     │
//! │                  │    publish()       │ Client Notifier  │
//! │                  │ ──────┐            │                  │
//! └──────────────────┘       │            └──────────────────┘
//!                            ▼                    ↑
//!                      ┌──────────────┐           │
//!                      │  Event Bus   │           │
//!                      │              │ ──────────┘
//!                      └──────────────┘  subscribe()
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{subsystem_ids, EventFilter, EventTopic, LedgerEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{Delivery, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
