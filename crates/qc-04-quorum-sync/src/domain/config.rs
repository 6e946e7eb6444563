//! # Sync Configuration

/// Batch size used when none is configured.
pub const DEFAULT_SYNC_BATCH_SIZE: usize = 200;

/// Upper bound on quanta per batch.
pub const MAX_SYNC_BATCH_SIZE: usize = 500;

/// Quorum sync configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_SYNC_BATCH_SIZE,
        }
    }
}

impl SyncConfig {
    /// Config with `batch_size` clamped to `1..=MAX_SYNC_BATCH_SIZE`.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.clamp(1, MAX_SYNC_BATCH_SIZE),
        }
    }

    /// Small batches so tests cross batch boundaries.
    pub fn for_testing() -> Self {
        Self::new(4)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_batch_size() {
        assert_eq!(SyncConfig::default().batch_size(), 200);
    }

    #[test]
    fn test_batch_size_is_clamped() {
        assert_eq!(SyncConfig::new(0).batch_size(), 1);
        assert_eq!(SyncConfig::new(10_000).batch_size(), MAX_SYNC_BATCH_SIZE);
        assert_eq!(SyncConfig::new(300).batch_size(), 300);
    }
}
