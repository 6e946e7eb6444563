//! # Adapters
//!
//! Port implementations connecting the subsystems to each other and to the
//! outside:
//!
//! - `storage`: key-value engines under the Apex Log
//! - `log_store`: the Apex Log as seen by the handler and the sync workers
//! - `loopback`: in-process transport for peers and clients

pub mod log_store;
pub mod loopback;
pub mod storage;

pub use log_store::{ChainSource, LogStore, NodeLog};
pub use loopback::{
    loopback_pair, spawn_client_reader, Envelope, Inbox, LoopbackLink, DEFAULT_LINK_CAPACITY,
};
pub use storage::{check_disk_space, StorageBackend};
