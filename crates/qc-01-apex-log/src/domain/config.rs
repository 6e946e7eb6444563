//! # Apex Log Configuration

/// Tunables for the Apex Log.
#[derive(Debug, Clone)]
pub struct ApexLogConfig {
    /// Number of trailing records whose chain links are re-verified on open.
    /// `0` skips the check.
    pub verify_depth: u64,

    /// Upper bound on records returned by a single `load_quanta` call.
    pub max_load_batch: usize,
}

impl Default for ApexLogConfig {
    fn default() -> Self {
        Self {
            verify_depth: 1_000,
            max_load_batch: 500,
        }
    }
}

impl ApexLogConfig {
    /// Full verification and small batches.
    pub fn for_testing() -> Self {
        Self {
            verify_depth: u64::MAX,
            max_load_batch: 64,
        }
    }

    /// Builder: set the open-time verification depth.
    pub fn with_verify_depth(mut self, depth: u64) -> Self {
        self.verify_depth = depth;
        self
    }
}
