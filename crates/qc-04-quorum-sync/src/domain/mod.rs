//! # Domain Layer
//!
//! - `errors`: `SyncError`
//! - `config`: batch sizing
//! - `cursor`: per-connection cursor with reset generations, sync phases
//! - `handshake`: challenge generation and echo confirmation

pub mod config;
pub mod cursor;
pub mod errors;
pub mod handshake;
