//! # File-Backed Store
//!
//! Keeps the whole map in memory and rewrites a snapshot file on every
//! write, via a temp file and an atomic rename. A crash leaves either the
//! old or the new snapshot, never a mix, which is what `atomic_batch_write`
//! needs. Suited to development and light nodes; production uses RocksDB.
//!
//! File format: `[key_len:u32][key][value_len:u32][value]... [crc32:u32]`,
//! little-endian lengths.

use super::{apply_batch, scan_backward, scan_forward, scan_prefix, Pairs};
use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Durable store persisting a snapshot file.
pub struct FileBackedKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    path: PathBuf,
}

fn io_error(err: std::io::Error) -> KVStoreError {
    KVStoreError::IOError {
        message: err.to_string(),
    }
}

fn corrupt(message: &str) -> KVStoreError {
    KVStoreError::CorruptionError {
        message: message.to_string(),
    }
}

impl FileBackedKVStore {
    /// Open the store at `path`, loading the snapshot if one exists.
    ///
    /// # Errors
    ///
    /// `CorruptionError` if the snapshot is truncated or fails its checksum.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read(&path) {
            Ok(bytes) => {
                let data = Self::decode(&bytes)?;
                info!(
                    "[qc-01] Loaded {} keys from {} ({} bytes)",
                    data.len(),
                    path.display(),
                    bytes.len()
                );
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("[qc-01] No existing storage file at {}", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(io_error(e)),
        };
        Ok(Self { data, path })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(bytes: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, KVStoreError> {
        if bytes.len() < 4 {
            return Err(corrupt("snapshot shorter than its checksum"));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 4);
        let mut crc = [0u8; 4];
        crc.copy_from_slice(trailer);
        if crc32fast::hash(body) != u32::from_le_bytes(crc) {
            return Err(corrupt("snapshot checksum mismatch"));
        }

        let mut data = BTreeMap::new();
        let mut cursor = 0;
        while cursor < body.len() {
            let key = Self::read_chunk(body, &mut cursor)?;
            let value = Self::read_chunk(body, &mut cursor)?;
            data.insert(key, value);
        }
        Ok(data)
    }

    fn read_chunk(body: &[u8], cursor: &mut usize) -> Result<Vec<u8>, KVStoreError> {
        let len_end = *cursor + 4;
        let len_bytes: [u8; 4] = body
            .get(*cursor..len_end)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| corrupt("truncated length prefix"))?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let chunk = body
            .get(len_end..len_end + len)
            .ok_or_else(|| corrupt("truncated entry"))?
            .to_vec();
        *cursor = len_end + len;
        Ok(chunk)
    }

    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (key, value) in &self.data {
            bytes.extend_from_slice(&(key.len() as u32).to_le_bytes());
            bytes.extend_from_slice(key);
            bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
            bytes.extend_from_slice(value);
        }
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes
    }

    fn save_to_file(&self) -> Result<(), KVStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path).map_err(io_error)?;
        file.write_all(&self.encode()).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;

        std::fs::rename(&temp_path, &self.path).map_err(io_error)
    }
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.atomic_batch_write(vec![BatchOperation::put(key, value)])
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.atomic_batch_write(vec![BatchOperation::delete(key)])
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let previous = self.data.clone();
        apply_batch(&mut self.data, operations);
        if let Err(e) = self.save_to_file() {
            // Keep memory in line with what is on disk.
            self.data = previous;
            return Err(e);
        }
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
