//! # Quorum Policy and Finality
//!
//! A quantum is final once the configured number of distinct known
//! auditors have signed its hash. Finality is tracked per apex; the
//! contiguous prefix of final apexes is the node's result cursor.

use shared_types::{PublicKey, QuorumThreshold, SignatureSet};
use std::collections::{BTreeSet, HashSet};

/// Known auditor set and threshold.
#[derive(Debug, Clone)]
pub struct QuorumPolicy {
    auditors: HashSet<PublicKey>,
    threshold: QuorumThreshold,
}

impl QuorumPolicy {
    pub fn new(auditors: impl IntoIterator<Item = PublicKey>, threshold: QuorumThreshold) -> Self {
        Self {
            auditors: auditors.into_iter().collect(),
            threshold,
        }
    }

    /// Signatures needed to finalize an apex. Never below one.
    pub fn required(&self) -> usize {
        self.threshold.required(self.auditors.len()).max(1)
    }

    pub fn auditor_count(&self) -> usize {
        self.auditors.len()
    }

    pub fn is_known(&self, key: &PublicKey) -> bool {
        self.auditors.contains(key)
    }

    /// Distinct known signers in `signatures`.
    pub fn count_known(&self, signatures: &SignatureSet) -> usize {
        signatures.iter().filter(|s| self.is_known(&s.signer)).count()
    }

    pub fn is_reached(&self, signatures: &SignatureSet) -> bool {
        self.count_known(signatures) >= self.required()
    }
}

/// Which apexes reached quorum, and the contiguous finalized prefix.
#[derive(Debug, Clone, Default)]
pub struct FinalityTracker {
    /// Every apex `<= contiguous` is final.
    contiguous: u64,
    /// Final apexes above `contiguous + 1`.
    ahead: BTreeSet<u64>,
}

impl FinalityTracker {
    /// Tracker whose prefix `1..=finalized` is already final.
    pub fn starting_at(finalized: u64) -> Self {
        Self {
            contiguous: finalized,
            ahead: BTreeSet::new(),
        }
    }

    /// Mark `apex` final. Returns `true` the first time only.
    pub fn mark(&mut self, apex: u64) -> bool {
        if self.is_final(apex) {
            return false;
        }
        self.ahead.insert(apex);
        while self.ahead.remove(&(self.contiguous + 1)) {
            self.contiguous += 1;
        }
        true
    }

    pub fn is_final(&self, apex: u64) -> bool {
        apex <= self.contiguous || self.ahead.contains(&apex)
    }

    /// Highest apex such that every apex up to it is final.
    pub fn last_contiguous(&self) -> u64 {
        self.contiguous
    }
}
