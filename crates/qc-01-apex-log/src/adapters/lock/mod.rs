//! # Database Process Locking
//!
//! Prevents two node processes from opening the same data directory.

mod dir_lock;

pub use dir_lock::{DatabaseLock, LockError};
