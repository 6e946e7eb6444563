//! # Quantum Handler (qc-02)
//!
//! Total ordering and chaining of quanta, plus signature accumulation.
//!
//! ## Flow
//!
//! ```text
//! Prime:   QuantumRequest ─→ sequence() ─→ [tip lock: assign apex, chain, persist]
//!                                              └─→ QuantumSequenced (bus)
//!
//! Auditor: SyncQuantaBatch ─→ apply() ─→ [tip lock: validate, persist]
//!                                              └─→ QuantumApplied (bus)
//!
//! Both:    signatures ─→ add_signatures() ─→ merge ─→ quorum? ─→ QuantumFinalized (bus)
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Single writer | The chain tip mutex spans "read last, compute next, persist" |
//! | Strict increment | Assigned apexes are `1, 2, 3, ...` with no gaps |
//! | Hash chain | `prev_hash` is the hash of the previous canonical encoding |
//! | Persist first | Events are published only after the store accepted the write |
//! | Idempotent merge | Repeated `(signer, signature)` pairs change nothing |
//! | Known signers | Signatures from unknown or forged keys never count |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Chain tip, quorum policy, finality tracking, errors
//! - `ports/` - `QuantumHandlerApi` (inbound), store/processor/clock (outbound)
//! - `adapters/` - SHA-256 payload processor, system clock
//! - `service/` - `QuantumHandler`

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{DigestPayloadProcessor, SystemTimeSource};
pub use domain::config::HandlerConfig;
pub use domain::errors::{HandlerError, StoreError};
pub use domain::quorum::{FinalityTracker, QuorumPolicy};
pub use ports::inbound::{QuantumHandlerApi, SignatureOutcome};
pub use ports::outbound::{PayloadProcessor, QuantumStore, TimeSource};
pub use service::{QuantumHandler, QuantumHandlerDependencies};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
