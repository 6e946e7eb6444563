//! # Domain Layer

pub mod chain;
pub mod config;
pub mod errors;
pub mod quorum;
