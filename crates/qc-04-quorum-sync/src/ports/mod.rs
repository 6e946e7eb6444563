//! # Ports
//!
//! - `outbound`: transport to one peer, read access to the local log

pub mod outbound;
