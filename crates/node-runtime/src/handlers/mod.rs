//! # Role Runtimes
//!
//! One runtime per role, chosen once at startup from the configured role:
//!
//! - `PrimeNode`: sequences client requests, syncs auditors, aggregates
//!   signatures and notifies clients of finality
//! - `AuditorNode`: applies, validates and co-signs the Prime's quanta

pub mod auditor;
pub mod prime;

pub use auditor::AuditorNode;
pub use prime::PrimeNode;
