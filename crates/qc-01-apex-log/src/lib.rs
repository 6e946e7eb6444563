//! # Apex Log (qc-01)
//!
//! The Apex Log is the single source of truth for the apex chain. Every
//! quantum is stored under its apex together with the signatures collected
//! so far, in one atomic batch.
//!
//! ## Domain Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Strict increment | `append` accepts only `last_apex + 1` |
//! | Hash chain | `prev_hash` must equal the hash of the stored predecessor |
//! | Atomic record | Quantum and signatures are never split across batches |
//! | Data integrity | Every record carries a CRC32 verified on read |
//! | Contiguous reads | `load_quanta` returns a gap-free run or fails |
//! | Crash recovery | Pending quanta are re-validated, never dropped or re-applied |
//!
//! ## Key Layout
//!
//! ```text
//! q | apex (BE u64)      → QuantumPersistentModel
//! a | account pubkey     → AccountPersistentModel
//! s | apex (BE u64)      → SettingsPersistentModel
//! m:cursors              → CursorsPersistentModel
//! m:pending              → PendingQuantaPersistentModel
//! m:pruned               → first retained apex
//! ```
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Persistent models, key layout, record codec, errors, config
//! - `ports/` - `KeyValueStore` SPI
//! - `adapters/` - In-memory and file-backed stores, data directory lock
//! - `service/` - `ApexLog` and startup recovery
//!
//! ## Usage
//!
//! ```ignore
//! use qc_01_apex_log::{ApexLog, ApexLogConfig, InMemoryKVStore};
//!
//! let log = ApexLog::open(InMemoryKVStore::new(), ApexLogConfig::default())?;
//! log.append(&quantum, &SignatureSet::new())?;
//! let run = log.load_quanta(1, 200)?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{DatabaseLock, FileBackedKVStore, InMemoryKVStore, LockError};
pub use domain::config::ApexLogConfig;
pub use domain::errors::{KVStoreError, LogError};
pub use domain::models::{
    AccountPersistentModel, ApexRecord, CursorsPersistentModel, PendingQuantaPersistentModel,
    QuantumPersistentModel, SettingsPersistentModel,
};
pub use ports::outbound::{BatchOperation, KeyValueStore};
pub use service::recovery::RecoveryReport;
pub use service::ApexLog;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
