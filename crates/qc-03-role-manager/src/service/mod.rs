//! # Services
//!
//! - `state_manager`: this node's lifecycle, observable through a watch channel
//! - `registry`: the Prime's view of every known auditor's reported state

pub mod registry;
pub mod state_manager;
