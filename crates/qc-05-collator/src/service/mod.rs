//! # Services
//!
//! - `collator`: `MessageCollator`, the pending-request registry
//! - `connection`: `ClientConnection` built on it

pub mod collator;
pub mod connection;
