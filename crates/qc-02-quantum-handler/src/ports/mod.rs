//! # Ports
//!
//! - `inbound`: API the runtime drives
//! - `outbound`: store, payload processor and clock the handler depends on

pub mod inbound;
pub mod outbound;
