//! # Domain Layer
//!
//! Persistent models and the rules for encoding them.

pub mod codec;
pub mod config;
pub mod errors;
pub mod keys;
pub mod models;
