//! # Node Container
//!
//! Configuration and the subsystem instances of one node.
//!
//! - Subsystems are built in dependency order (log → handler → role)
//! - Cross-subsystem notifications travel over the event bus
//! - Adapters implement each subsystem's outbound ports

pub mod config;
pub mod subsystems;

pub use config::{ConfigError, NodeConfig, SecretSeed, StorageKind};
pub use subsystems::{NodeContainer, NodeHandler, NodeStatus};
