//! # Adapters Module
//!
//! - `memory`: ordered in-memory store for tests and ephemeral nodes
//! - `file`: snapshot-file store for durable runs without RocksDB
//! - `lock`: data directory process lock

pub mod file;
pub mod lock;
pub mod memory;

pub use file::FileBackedKVStore;
pub use lock::{DatabaseLock, LockError};
pub use memory::InMemoryKVStore;

use crate::ports::outbound::BatchOperation;
use std::collections::BTreeMap;

type Pairs = Vec<(Vec<u8>, Vec<u8>)>;

fn apply_batch(data: &mut BTreeMap<Vec<u8>, Vec<u8>>, operations: Vec<BatchOperation>) {
    for op in operations {
        match op {
            BatchOperation::Put { key, value } => {
                data.insert(key, value);
            }
            BatchOperation::Delete { key } => {
                data.remove(&key);
            }
        }
    }
}

fn scan_forward(data: &BTreeMap<Vec<u8>, Vec<u8>>, start: &[u8], prefix: &[u8], limit: usize) -> Pairs {
    data.range(start.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .take(limit)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn scan_backward(data: &BTreeMap<Vec<u8>, Vec<u8>>, start: &[u8], prefix: &[u8], limit: usize) -> Pairs {
    data.range(..=start.to_vec())
        .rev()
        .take_while(|(k, _)| k.starts_with(prefix))
        .take(limit)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn scan_prefix(data: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> Pairs {
    scan_forward(data, prefix, prefix, usize::MAX)
}
