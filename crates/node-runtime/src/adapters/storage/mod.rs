//! # Storage Backends
//!
//! `StorageBackend` picks the Apex Log's key-value engine at startup from
//! `NodeConfig::storage`. RocksDB is compiled in with the `rocksdb`
//! feature:
//!
//! ```toml
//! node-runtime = { path = "...", features = ["rocksdb"] }
//! ```

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};

use crate::container::config::StorageKind;
use qc_01_apex_log::{
    BatchOperation, FileBackedKVStore, InMemoryKVStore, KVStoreError, KeyValueStore,
};
use std::path::Path;
use tracing::warn;

type Pairs = Vec<(Vec<u8>, Vec<u8>)>;

/// File name of the snapshot store inside the data directory.
pub const SNAPSHOT_FILE: &str = "apex.db";

/// Directory name of the RocksDB store inside the data directory.
pub const ROCKSDB_DIR: &str = "rocksdb";

/// The engine under the node's Apex Log.
pub enum StorageBackend {
    Memory(InMemoryKVStore),
    File(FileBackedKVStore),
    #[cfg(feature = "rocksdb")]
    RocksDb(RocksDbStore),
}

impl StorageBackend {
    /// Open the engine `kind` under `data_dir`.
    pub fn open(kind: StorageKind, data_dir: &Path) -> Result<Self, KVStoreError> {
        match kind {
            StorageKind::Memory => Ok(StorageBackend::Memory(InMemoryKVStore::new())),
            StorageKind::File => {
                FileBackedKVStore::open(data_dir.join(SNAPSHOT_FILE)).map(StorageBackend::File)
            }
            #[cfg(feature = "rocksdb")]
            StorageKind::RocksDb => {
                RocksDbStore::open_default(data_dir.join(ROCKSDB_DIR)).map(StorageBackend::RocksDb)
            }
            #[cfg(not(feature = "rocksdb"))]
            StorageKind::RocksDb => Err(KVStoreError::IOError {
                message: "built without the rocksdb feature".to_string(),
            }),
        }
    }

    fn inner(&self) -> &dyn KeyValueStore {
        match self {
            StorageBackend::Memory(store) => store,
            StorageBackend::File(store) => store,
            #[cfg(feature = "rocksdb")]
            StorageBackend::RocksDb(store) => store,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn KeyValueStore {
        match self {
            StorageBackend::Memory(store) => store,
            StorageBackend::File(store) => store,
            #[cfg(feature = "rocksdb")]
            StorageBackend::RocksDb(store) => store,
        }
    }
}

impl KeyValueStore for StorageBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.inner().get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.inner_mut().put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.inner_mut().delete(key)
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        self.inner_mut().atomic_batch_write(operations)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        self.inner().exists(key)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Pairs, KVStoreError> {
        self.inner().prefix_scan(prefix)
    }

    fn scan_from(&self, start: &[u8], prefix: &[u8], limit: usize) -> Result<Pairs, KVStoreError> {
        self.inner().scan_from(start, prefix, limit)
    }

    fn scan_back_from(
        &self,
        start: &[u8],
        prefix: &[u8],
        limit: usize,
    ) -> Result<Pairs, KVStoreError> {
        self.inner().scan_back_from(start, prefix, limit)
    }
}

/// Warn when the data directory's volume runs low. Best effort: a failed
/// probe is logged and ignored.
pub fn check_disk_space(data_dir: &Path, min_free_bytes: u64) -> Option<u64> {
    match fs2::available_space(data_dir) {
        Ok(available) => {
            if available < min_free_bytes {
                warn!(
                    available,
                    required = min_free_bytes,
                    "[qc-01] Low disk space under {}",
                    data_dir.display()
                );
            }
            Some(available)
        }
        Err(e) => {
            warn!("[qc-01] Cannot read free space of {}: {}", data_dir.display(), e);
            None
        }
    }
}
