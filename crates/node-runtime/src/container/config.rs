//! # Node Configuration
//!
//! Unified configuration for the node runtime, loaded from `QC_*`
//! environment variables by the binary.
//!
//! ## Security Requirements
//!
//! - The node secret MUST be supplied in production; it is the identity
//!   auditors sign with and peers authenticate envelopes against
//! - An Auditor's own key MUST appear in the configured auditor set

use qc_04_quorum_sync::MAX_SYNC_BATCH_SIZE;
use shared_crypto::Ed25519KeyPair;
use shared_types::{NodeRole, PublicKey, QuorumThreshold};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Storage engine behind the Apex Log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Ephemeral; everything is lost on exit.
    Memory,
    /// Snapshot file under the data directory.
    File,
    /// RocksDB under the data directory. Requires the `rocksdb` feature.
    RocksDb,
}

impl StorageKind {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Some(StorageKind::Memory),
            "file" => Some(StorageKind::File),
            "rocksdb" => Some(StorageKind::RocksDb),
            _ => None,
        }
    }

    /// Whether the backend survives a restart.
    pub fn is_durable(&self) -> bool {
        !matches!(self, StorageKind::Memory)
    }
}

/// 32-byte Ed25519 seed. Never printed.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecretSeed(pub [u8; 32]);

impl fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretSeed(..)")
    }
}

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Prime or Auditor, fixed for the lifetime of the process.
    pub role: NodeRole,
    /// Node identity seed.
    pub secret: Option<SecretSeed>,
    /// Data directory for the Apex Log and its lock file.
    pub data_dir: PathBuf,
    /// Storage engine.
    pub storage: StorageKind,
    /// Public key of the Prime. Required on Auditors.
    pub prime_key: Option<PublicKey>,
    /// Known auditor public keys.
    pub auditors: Vec<PublicKey>,
    /// Signatures required for finality.
    pub threshold: QuorumThreshold,
    /// Quanta per sync batch.
    pub sync_batch_size: usize,
    /// Unread events a bus subscriber may fall behind before it lags.
    pub event_bus_capacity: usize,
    /// Client request deadline in milliseconds.
    pub request_timeout_ms: u64,
    /// How long startup waits for the data directory lock.
    pub lock_timeout_ms: u64,
    /// Free space below which startup warns.
    pub min_free_disk_bytes: u64,
    /// `EnvFilter` directive for logging.
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: NodeRole::Prime,
            secret: None,
            data_dir: PathBuf::from("./data"),
            storage: StorageKind::File,
            prime_key: None,
            auditors: Vec::new(),
            threshold: QuorumThreshold::Majority,
            sync_batch_size: qc_04_quorum_sync::DEFAULT_SYNC_BATCH_SIZE,
            event_bus_capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
            request_timeout_ms: 10_000,
            lock_timeout_ms: 5_000,
            min_free_disk_bytes: 512 * 1024 * 1024,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// In-memory node with small sync batches and short timeouts.
    pub fn for_testing(role: NodeRole, secret: [u8; 32]) -> Self {
        Self {
            role,
            secret: Some(SecretSeed(secret)),
            storage: StorageKind::Memory,
            sync_batch_size: 4,
            request_timeout_ms: 2_000,
            lock_timeout_ms: 500,
            min_free_disk_bytes: 0,
            log_level: "debug".to_string(),
            ..Self::default()
        }
    }

    /// Builder: auditor set and threshold.
    pub fn with_auditors(mut self, auditors: Vec<PublicKey>, threshold: QuorumThreshold) -> Self {
        self.auditors = auditors;
        self.threshold = threshold;
        self
    }

    /// Builder: the Prime an Auditor follows.
    pub fn with_prime(mut self, prime_key: PublicKey) -> Self {
        self.prime_key = Some(prime_key);
        self
    }

    /// Builder: durable storage under `data_dir`.
    pub fn with_storage(mut self, storage: StorageKind, data_dir: impl Into<PathBuf>) -> Self {
        self.storage = storage;
        self.data_dir = data_dir.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Node identity derived from the secret.
    pub fn identity(&self) -> Result<Ed25519KeyPair, ConfigError> {
        self.secret
            .map(|seed| Ed25519KeyPair::from_seed(seed.0))
            .ok_or(ConfigError::MissingSecret)
    }

    /// Check the configuration can run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let identity = self.identity()?;

        if self.auditors.is_empty() {
            return Err(ConfigError::NoAuditors);
        }
        let mut seen = HashSet::new();
        for key in &self.auditors {
            if !seen.insert(key) {
                return Err(ConfigError::DuplicateAuditor(hex::encode(key)));
            }
        }

        let required = self.threshold.required(self.auditors.len());
        if required == 0 || required > self.auditors.len() {
            return Err(ConfigError::UnreachableQuorum {
                required,
                auditors: self.auditors.len(),
            });
        }

        if self.sync_batch_size == 0 || self.sync_batch_size > MAX_SYNC_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize(self.sync_batch_size));
        }

        if self.event_bus_capacity == 0 {
            return Err(ConfigError::invalid(
                "QC_EVENT_BUS_CAPACITY",
                "must be at least 1",
            ));
        }

        if self.storage == StorageKind::RocksDb && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::RocksDbUnavailable);
        }

        let own_key = *identity.public_key().as_bytes();
        match self.role {
            NodeRole::Prime => {
                if self.auditors.contains(&own_key) {
                    return Err(ConfigError::PrimeIsAuditor);
                }
            }
            NodeRole::Auditor => {
                let prime_key = self.prime_key.ok_or(ConfigError::MissingPrimeKey)?;
                if prime_key == own_key {
                    return Err(ConfigError::PrimeIsAuditor);
                }
                if !self.auditors.contains(&own_key) {
                    return Err(ConfigError::NotAnAuditor(hex::encode(own_key)));
                }
            }
        }
        Ok(())
    }

    /// Load from process environment on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load from a variable lookup on top of the defaults.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `QC_ROLE` | `prime` or `auditor` |
    /// | `QC_SECRET` | 64 hex chars, identity seed |
    /// | `QC_DATA_DIR` | data directory |
    /// | `QC_STORAGE` | `memory`, `file` or `rocksdb` |
    /// | `QC_PRIME_KEY` | 64 hex chars |
    /// | `QC_AUDITORS` | comma separated hex keys |
    /// | `QC_QUORUM` | `majority` or a count |
    /// | `QC_SYNC_BATCH_SIZE` | quanta per sync batch |
    /// | `QC_REQUEST_TIMEOUT_MS` | client request deadline |
    /// | `QC_EVENT_BUS_CAPACITY` | event bus backlog per subscriber |
    /// | `QC_LOG_LEVEL` | `EnvFilter` directive |
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(role) = lookup("QC_ROLE") {
            config.role = match role.to_ascii_lowercase().as_str() {
                "prime" => NodeRole::Prime,
                "auditor" => NodeRole::Auditor,
                _ => return Err(ConfigError::invalid("QC_ROLE", "expected prime or auditor")),
            };
        }
        if let Some(secret) = lookup("QC_SECRET") {
            config.secret = Some(SecretSeed(parse_key("QC_SECRET", &secret)?));
        }
        if let Some(dir) = lookup("QC_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(storage) = lookup("QC_STORAGE") {
            config.storage = StorageKind::parse(&storage)
                .ok_or_else(|| ConfigError::invalid("QC_STORAGE", "expected memory, file or rocksdb"))?;
        }
        if let Some(key) = lookup("QC_PRIME_KEY") {
            config.prime_key = Some(parse_key("QC_PRIME_KEY", &key)?);
        }
        if let Some(list) = lookup("QC_AUDITORS") {
            config.auditors = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|key| parse_key("QC_AUDITORS", key))
                .collect::<Result<_, _>>()?;
        }
        if let Some(quorum) = lookup("QC_QUORUM") {
            config.threshold = if quorum.eq_ignore_ascii_case("majority") {
                QuorumThreshold::Majority
            } else {
                QuorumThreshold::Count(parse_number("QC_QUORUM", &quorum)?)
            };
        }
        if let Some(size) = lookup("QC_SYNC_BATCH_SIZE") {
            config.sync_batch_size = parse_number("QC_SYNC_BATCH_SIZE", &size)?;
        }
        if let Some(ms) = lookup("QC_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = parse_number("QC_REQUEST_TIMEOUT_MS", &ms)?;
        }
        if let Some(capacity) = lookup("QC_EVENT_BUS_CAPACITY") {
            config.event_bus_capacity = parse_number("QC_EVENT_BUS_CAPACITY", &capacity)?;
        }
        if let Some(level) = lookup("QC_LOG_LEVEL") {
            config.log_level = level;
        }
        Ok(config)
    }
}

fn parse_key(name: &'static str, value: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(value.trim()).map_err(|e| ConfigError::invalid(name, e))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| ConfigError::invalid(name, format!("expected 32 bytes, got {}", b.len())))
}

fn parse_number<N: std::str::FromStr>(name: &'static str, value: &str) -> Result<N, ConfigError>
where
    N::Err: fmt::Display,
{
    value.trim().parse().map_err(|e| ConfigError::invalid(name, e))
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No identity seed configured.
    #[error("Node secret is not set. Set QC_SECRET to a 32-byte hex seed.")]
    MissingSecret,

    #[error("Auditor role requires QC_PRIME_KEY")]
    MissingPrimeKey,

    #[error("No auditors configured")]
    NoAuditors,

    #[error("Auditor {0} listed twice")]
    DuplicateAuditor(String),

    #[error("Quorum of {required} cannot be met by {auditors} auditors")]
    UnreachableQuorum { required: usize, auditors: usize },

    #[error("Sync batch size {0} is outside 1..={max}", max = MAX_SYNC_BATCH_SIZE)]
    InvalidBatchSize(usize),

    /// The Auditor's own key is not in the auditor set.
    #[error("Own key {0} is not a configured auditor")]
    NotAnAuditor(String),

    #[error("The Prime key cannot also be an auditor")]
    PrimeIsAuditor,

    #[error("RocksDB storage requested but the node was built without the rocksdb feature")]
    RocksDbUnavailable,

    #[error("Invalid {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl fmt::Display) -> Self {
        ConfigError::InvalidVar {
            name,
            reason: reason.to_string(),
        }
    }
}
