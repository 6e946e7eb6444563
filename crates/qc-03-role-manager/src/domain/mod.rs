//! # Domain Layer

pub mod errors;
pub mod lifecycle;
pub mod role;
