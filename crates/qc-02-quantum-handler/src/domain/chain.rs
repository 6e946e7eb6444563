//! # Chain Tip
//!
//! The last chained quantum as seen by this node. Owned by the handler
//! behind its single-writer lock; never shared as a bare counter.

use shared_types::{Hash, Quantum, QuantumError, ZERO_HASH};

/// Apex, hash and timestamp of the last persisted quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    pub last_apex: u64,
    pub last_hash: Hash,
    pub last_timestamp: i64,
}

impl Default for ChainTip {
    fn default() -> Self {
        Self::genesis()
    }
}

impl ChainTip {
    /// Tip of an empty log.
    pub fn genesis() -> Self {
        Self {
            last_apex: 0,
            last_hash: ZERO_HASH,
            last_timestamp: 0,
        }
    }

    /// Tip positioned on `quantum`.
    pub fn at(quantum: &Quantum) -> Self {
        Self {
            last_apex: quantum.apex,
            last_hash: quantum.hash(),
            last_timestamp: quantum.timestamp,
        }
    }

    /// Apex the next quantum must carry.
    pub fn next_apex(&self) -> u64 {
        self.last_apex + 1
    }

    /// Timestamp for the next quantum: wall clock, never below the tip.
    pub fn next_timestamp(&self, now_millis: i64) -> i64 {
        now_millis.max(self.last_timestamp)
    }

    /// Check that `quantum` directly extends this tip.
    ///
    /// Gaps and hash breaks are `ChainMismatch`: the node is behind or
    /// forked, the quantum itself may be fine. A regressing timestamp is
    /// `PayloadInvalid`.
    pub fn check_successor(&self, quantum: &Quantum) -> Result<(), QuantumError> {
        if quantum.apex != self.next_apex() {
            return Err(QuantumError::ChainMismatch {
                apex: quantum.apex,
                reason: format!("expected apex {}", self.next_apex()),
            });
        }
        if quantum.prev_hash != self.last_hash {
            return Err(QuantumError::ChainMismatch {
                apex: quantum.apex,
                reason: "prev_hash does not match the local predecessor".to_string(),
            });
        }
        if quantum.timestamp < self.last_timestamp {
            return Err(QuantumError::PayloadInvalid {
                apex: quantum.apex,
                reason: format!(
                    "timestamp {} precedes predecessor {}",
                    quantum.timestamp, self.last_timestamp
                ),
            });
        }
        Ok(())
    }

    /// Move the tip onto `quantum`.
    pub fn advance(&mut self, quantum: &Quantum) {
        *self = Self::at(quantum);
    }
}
