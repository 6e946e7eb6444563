//! # Apex-Chain Test Suite
//!
//! Unified test crate for scenarios that span several crates. Each scenario
//! runs a Prime, its Auditors and clients inside one process, connected by
//! loopback links.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs    # node, link and client setup
//!     ├── chain.rs      # sequencing and hash chaining
//!     ├── finality.rs   # signature quorum before client finality
//!     ├── catch_up.rs   # disconnect, reconnect, exactly-once delivery
//!     ├── replay.rs     # reused request identifiers
//!     └── recovery.rs   # crash with pending quanta, restart
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p qc-tests
//! cargo test -p qc-tests integration::catch_up::
//! ```

pub mod integration;
