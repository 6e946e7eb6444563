//! # Ports
//!
//! The Apex Log drives a single outbound port: an ordered key-value store.

pub mod outbound;
