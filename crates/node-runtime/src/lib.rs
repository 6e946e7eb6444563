//! # Node Runtime Library
//!
//! Wiring of one apex-chain node: configuration, storage engine selection,
//! startup recovery and the Prime or Auditor runtime. The `node-runtime`
//! binary is a thin shell around this library; the integration suite
//! drives it directly over in-process links.
//!
//! ## Modules
//!
//! - `container/` - configuration and the subsystem container
//! - `adapters/` - storage engines, Apex Log ports, loopback transport
//! - `handlers/` - Prime and Auditor runtimes
//! - `wiring/` - event bus routing into the runtimes
//! - `logging` - tracing subscriber setup

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod container;
pub mod errors;
pub mod handlers;
pub mod logging;
pub mod wiring;

pub use container::{NodeConfig, NodeContainer, NodeStatus, StorageKind};
pub use errors::NodeError;
pub use handlers::{AuditorNode, PrimeNode};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
