//! # QC-05 Collator
//!
//! Client-side correlation of asynchronous responses with the requests that
//! caused them.
//!
//! **Subsystem ID:** 5
//! **Architecture:** Hexagonal (Domain + Ports/Adapters)
//!
//! ## Request Lifecycle
//!
//! ```text
//! add(id) ──→ pending ──resolve(id)──────→ Ok(response)
//!                │
//!                ├──deadline──────────────→ Err(Timeout)   (late response discarded)
//!                │
//!                └──connection closed─────→ Err(ConnectionClosed { status, description })
//! ```
//!
//! | Rule | Description |
//! |------|-------------|
//! | Non-zero ids | `0` marks notifications and cannot be registered |
//! | Single key space | A pending id cannot be registered twice |
//! | Exactly one outcome | Every request ends in a response or an error |
//! | Unmatched is unsolicited | Envelopes without a pending id are notifications |

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::errors::{CollatorError, CLOSE_GOING_AWAY, CLOSE_NORMAL};
pub use domain::pending::{Completion, PendingRequest, Response, ResponseHandle};
pub use ports::outbound::ClientTransport;
pub use service::collator::{CollatorStats, MessageCollator, Resolution};
pub use service::connection::{ClientConnection, Submission};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
