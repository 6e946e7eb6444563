//! # Domain Layer
//!
//! - `errors`: `CollatorError`, close status codes
//! - `pending`: a registered request and the handle its caller awaits

pub mod errors;
pub mod pending;
