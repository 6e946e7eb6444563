//! # Ports
//!
//! - `outbound`: the client side of a connection to a node

pub mod outbound;
