//! # In-Memory Store
//!
//! `BTreeMap`-backed store. Keys iterate in order, which the apex-keyed
//! range scans rely on.

use super::{apply_batch, scan_backward, scan_forward, scan_prefix, Pairs};
use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore};
use std::collections::BTreeMap;

/// In-memory key-value store for tests and ephemeral nodes.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        apply_batch(&mut self.data, operations);
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Pairs, KVStoreError> {
        Ok(scan_prefix(&self.data, prefix))
    }

    fn scan_from(&self, start: &[u8], prefix: &[u8], limit: usize) -> Result<Pairs, KVStoreError> {
        Ok(scan_forward(&self.data, start, prefix, limit))
    }

    fn scan_back_from(
        &self,
        start: &[u8],
        prefix: &[u8],
        limit: usize,
    ) -> Result<Pairs, KVStoreError> {
        Ok(scan_backward(&self.data, start, prefix, limit))
    }
}
