//! # Record Codec
//!
//! Records are stored as `bincode(body) | crc32(body) BE`. The checksum is
//! verified on every read.

use crate::domain::errors::LogError;
use serde::de::DeserializeOwned;
use serde::Serialize;

const CHECKSUM_LEN: usize = 4;

/// Encode a record with its CRC32 trailer.
pub fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>, LogError> {
    let mut bytes = bincode::serialize(record).map_err(LogError::encoding)?;
    let checksum = crc32fast::hash(&bytes);
    bytes.extend_from_slice(&checksum.to_be_bytes());
    Ok(bytes)
}

/// Verify the CRC32 trailer and decode the body.
///
/// `key` is only used to label a checksum failure.
pub fn decode_record<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T, LogError> {
    if bytes.len() < CHECKSUM_LEN {
        return Err(LogError::ChecksumMismatch {
            key: hex::encode(key),
        });
    }
    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let mut expected = [0u8; CHECKSUM_LEN];
    expected.copy_from_slice(trailer);
    if crc32fast::hash(body) != u32::from_be_bytes(expected) {
        return Err(LogError::ChecksumMismatch {
            key: hex::encode(key),
        });
    }
    bincode::deserialize(body).map_err(LogError::encoding)
}
