//! # Shared Types Crate
//!
//! This crate contains the apex-chain domain entities, node lifecycle enums,
//! the `MessageEnvelope<T>` wrapper and every wire payload exchanged between
//! the Prime, the Auditors and clients.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Canonical Encoding**: `Quantum::canonical_bytes` is the only input to
//!   chain hashing and auditor signatures.
//! - **Envelope Correlation**: `message_id == 0` marks a notification; any
//!   other id is echoed by the responder.

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod messages;
pub mod state;

pub use entities::*;
pub use envelope::MessageEnvelope;
pub use errors::*;
pub use messages::*;
pub use state::*;
