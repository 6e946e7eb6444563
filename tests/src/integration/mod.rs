//! # Integration Scenarios
//!
//! Whole-node scenarios over loopback links. Every scenario starts its own
//! cluster; durable ones use a temporary data directory.

pub mod harness;

mod catch_up;
mod chain;
mod finality;
mod recovery;
mod replay;
