//! # Wiring
//!
//! Connects the event bus to the role runtimes. Subsystems never call each
//! other on event paths; the handler publishes and the runtime's sink reacts
//! (waking sync workers, notifying clients, reporting state changes).

pub mod event_routing;

pub use event_routing::{spawn_router, LedgerEventSink};
