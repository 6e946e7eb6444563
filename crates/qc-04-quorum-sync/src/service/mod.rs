//! # Quorum Sync Services
//!
//! - `connection`: per-peer record (cursors, states, wake and shutdown)
//! - `manager`: `ConnectionManager`, owner of every record
//! - `worker`: `QuantumSyncWorker`, one per confirmed connection
//! - `notifier`: per-peer fan-out with isolated failures

pub mod connection;
pub mod manager;
pub mod notifier;
pub mod worker;
