//! # QC-04 Quorum Sync
//!
//! Keeps every connected auditor's replica caught up with the local apex log
//! and streams new quanta and finalized signatures as they appear.
//!
//! **Subsystem ID:** 4
//! **Architecture:** Hexagonal (Domain + Ports/Adapters)
//!
//! ## Connection Lifecycle
//!
//! ```text
//! register ──HandshakeRequest──→ peer
//!          ←─AuditorHandshakeResponse (echo, cursors, state)
//! complete_handshake: echo ok? ──no──→ close (never retried)
//!                          │yes
//!                          ↓
//!                 [Syncing] worker: batches from cursor + 1
//!                          ↓ nothing left to send
//!                 [Live]    worker: woken on new quanta / signatures
//!                          ↓ connection lost
//!                 [Uninitialized]
//! ```
//!
//! ## Guarantees
//!
//! | Guarantee | Mechanism |
//! |-----------|-----------|
//! | Ascending, gap-free batches | `ensure_contiguous` on every batch; a gap is `ChainMismatch` |
//! | Reset safety | Cursor generations; stale batches cannot advance the cursor |
//! | Bounded memory per peer | One in-flight batch, `1..=500` quanta each |
//! | Decoupled sequencing | Sequencer only calls `wake_all`; it never awaits a worker |
//! | Isolated peer failures | `Notifier` collects one `Result` per peer |
//!
//! ## Module Structure
//!
//! - `domain/` - `SyncError`, `SyncConfig`, `SyncCursor`, `SyncPhase`, `HandshakeChallenge`
//! - `ports/` - `PeerTransport`, `SyncSource`
//! - `service/` - `PeerConnection`, `ConnectionManager`, `QuantumSyncWorker`, `Notifier`

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::config::{SyncConfig, DEFAULT_SYNC_BATCH_SIZE, MAX_SYNC_BATCH_SIZE};
pub use domain::cursor::{SyncCursor, SyncPhase};
pub use domain::errors::SyncError;
pub use domain::handshake::HandshakeChallenge;
pub use ports::outbound::{PeerTransport, SyncSource};
pub use service::connection::PeerConnection;
pub use service::manager::ConnectionManager;
pub use service::notifier::{BroadcastReport, Notifier};
pub use service::worker::QuantumSyncWorker;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
