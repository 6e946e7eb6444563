//! # RocksDB Storage Adapter
//!
//! Production RocksDB implementation of the Apex Log's `KeyValueStore`.
//!
//! ## Features
//!
//! - Atomic batch writes (WriteBatch)
//! - Snappy compression
//! - Bloom filters for point reads
//! - fsync on write for durability
//!
//! Every Apex Log key family (quanta, accounts, settings, cursors, pending)
//! shares the default column family; keys carry their own prefix byte and
//! big-endian apex, so iterator order is apex order.

use parking_lot::RwLock;
use qc_01_apex_log::{BatchOperation, KVStoreError, KeyValueStore};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

type Pairs = Vec<(Vec<u8>, Vec<u8>)>;

/// RocksDB configuration.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: PathBuf,
    /// Block cache size in bytes (default: 128MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 32MB)
    pub write_buffer_size: usize,
    /// Maximum number of write buffers (default: 3)
    pub max_write_buffer_number: i32,
    /// Target file size for level-1 (default: 64MB)
    pub target_file_size_base: u64,
    /// Enable fsync after each write (default: true for durability)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/apex"),
            block_cache_size: 128 * 1024 * 1024,
            write_buffer_size: 32 * 1024 * 1024,
            max_write_buffer_number: 3,
            target_file_size_base: 64 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Default tuning at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create config for testing (smaller buffers, no sync)
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            max_write_buffer_number: 2,
            target_file_size_base: 4 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

fn io_error(action: &str, err: rocksdb::Error) -> KVStoreError {
    KVStoreError::IOError {
        message: format!("RocksDB {} failed: {}", action, err),
    }
}

/// RocksDB-backed key-value store.
pub struct RocksDbStore {
    db: Arc<RwLock<DB>>,
    config: RocksDbConfig,
}

impl RocksDbStore {
    /// Open or create a RocksDB database
    pub fn open(config: RocksDbConfig) -> Result<Self, KVStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_target_file_size_base(config.target_file_size_base);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path).map_err(|e| io_error("open", e))?;
        info!(path = %config.path.display(), "[qc-01] RocksDB opened");

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            config,
        })
    }

    /// Open with default tuning.
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self, KVStoreError> {
        Self::open(RocksDbConfig::at(path.as_ref()))
    }

    fn write_options(&self) -> rocksdb::WriteOptions {
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }

    fn collect(
        &self,
        mode: IteratorMode<'_>,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Pairs, KVStoreError> {
        let db = self.db.read();
        let mut results = Vec::new();
        for item in db.iterator(mode) {
            if results.len() >= limit {
                break;
            }
            let (key, value) = item.map_err(|e| io_error("scan", e))?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.db.read().get(key).map_err(|e| io_error("get", e))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        let write_opts = self.write_options();
        self.db
            .write()
            .put_opt(key, value, &write_opts)
            .map_err(|e| io_error("put", e))
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        let write_opts = self.write_options();
        self.db
            .write()
            .delete_opt(key, &write_opts)
            .map_err(|e| io_error("delete", e))
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
                BatchOperation::Delete { key } => batch.delete(&key),
            }
        }
        let write_opts = self.write_options();
        self.db
            .write()
            .write_opt(batch, &write_opts)
            .map_err(|e| io_error("batch write", e))
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        self.db
            .read()
            .get_pinned(key)
            .map(|v| v.is_some())
            .map_err(|e| io_error("exists check", e))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Pairs, KVStoreError> {
        self.collect(IteratorMode::From(prefix, Direction::Forward), prefix, usize::MAX)
    }

    fn scan_from(&self, start: &[u8], prefix: &[u8], limit: usize) -> Result<Pairs, KVStoreError> {
        self.collect(IteratorMode::From(start, Direction::Forward), prefix, limit)
    }

    fn scan_back_from(
        &self,
        start: &[u8],
        prefix: &[u8],
        limit: usize,
    ) -> Result<Pairs, KVStoreError> {
        self.collect(IteratorMode::From(start, Direction::Reverse), prefix, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ordered_scans() {
        let dir = tempdir().unwrap();
        let mut store = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();

        store
            .atomic_batch_write(vec![
                BatchOperation::put(vec![1, 1], b"a".to_vec()),
                BatchOperation::put(vec![1, 2], b"b".to_vec()),
                BatchOperation::put(vec![1, 3], b"c".to_vec()),
                BatchOperation::put(vec![2, 1], b"other".to_vec()),
            ])
            .unwrap();

        let forward = store.scan_from(&[1, 2], &[1], 10).unwrap();
        assert_eq!(forward.len(), 2);
        assert_eq!(forward[0].1, b"b".to_vec());

        let back = store.scan_back_from(&[1, 9], &[1], 1).unwrap();
        assert_eq!(back[0].0, vec![1, 3]);

        assert_eq!(store.prefix_scan(&[1]).unwrap().len(), 3);

        store.delete(&[1, 3]).unwrap();
        assert!(!store.exists(&[1, 3]).unwrap());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        {
            let mut store = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();
            store.put(b"k", b"v").unwrap();
        }
        let store = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
