//! # Persistent Models
//!
//! Storage-side representation of every record the Apex Log keeps. All
//! models are append/replace only; a quantum's core fields never change
//! once written. Only its signature set grows.

use crate::domain::errors::LogError;
use serde::{Deserialize, Serialize};
use shared_types::{Cursors, PublicKey, Quantum, QuorumThreshold, SignatureSet};

/// A quantum as read back from the log, with its accumulated signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApexRecord {
    pub quantum: Quantum,
    pub signatures: SignatureSet,
}

/// One record per apex: the encoded quantum and the signatures collected
/// for it, always written together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumPersistentModel {
    pub apex: u64,
    /// bincode of the full `Quantum`.
    pub raw_quantum: Vec<u8>,
    pub signatures: SignatureSet,
    pub timestamp: i64,
    /// Copy of the effects digest, readable without decoding `raw_quantum`.
    pub effects: Vec<u8>,
}

impl QuantumPersistentModel {
    /// Build the stored form of a quantum.
    pub fn new(quantum: &Quantum, signatures: SignatureSet) -> Result<Self, LogError> {
        Ok(Self {
            apex: quantum.apex,
            raw_quantum: bincode::serialize(quantum).map_err(LogError::encoding)?,
            signatures,
            timestamp: quantum.timestamp,
            effects: quantum.effects_proof.clone(),
        })
    }

    /// Decode the stored quantum.
    pub fn quantum(&self) -> Result<Quantum, LogError> {
        let quantum: Quantum = bincode::deserialize(&self.raw_quantum).map_err(LogError::encoding)?;
        if quantum.apex != self.apex {
            return Err(LogError::CorruptLog {
                reason: format!(
                    "record keyed at apex {} holds quantum {}",
                    self.apex, quantum.apex
                ),
            });
        }
        Ok(quantum)
    }

    /// Decode into an `ApexRecord`.
    pub fn into_record(self) -> Result<ApexRecord, LogError> {
        let quantum = self.quantum()?;
        Ok(ApexRecord {
            quantum,
            signatures: self.signatures,
        })
    }
}

/// Per-account snapshot maintained alongside the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPersistentModel {
    pub public_key: PublicKey,
    /// Number of quanta sequenced for this account.
    pub nonce: u64,
    /// Highest request id sequenced for this account.
    pub last_request_id: u64,
    /// Apex of the most recent quantum for this account.
    pub last_update_apex: u64,
}

impl AccountPersistentModel {
    /// Empty snapshot for an account with no history.
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            nonce: 0,
            last_request_id: 0,
            last_update_apex: 0,
        }
    }

    /// Fold a quantum issued by this account into the snapshot.
    pub fn record(&mut self, quantum: &Quantum) {
        self.nonce += 1;
        self.last_request_id = self.last_request_id.max(quantum.request.request_id);
        self.last_update_apex = quantum.apex;
    }
}

/// Node settings, versioned by the apex from which they apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPersistentModel {
    pub apex: u64,
    pub auditors: Vec<PublicKey>,
    pub threshold: QuorumThreshold,
    pub sync_batch_size: u32,
}

/// The node's own cursor pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorsPersistentModel {
    pub quantum_cursor: u64,
    pub result_cursor: u64,
}

impl From<Cursors> for CursorsPersistentModel {
    fn from(cursors: Cursors) -> Self {
        Self {
            quantum_cursor: cursors.quantum_cursor,
            result_cursor: cursors.result_cursor,
        }
    }
}

impl From<CursorsPersistentModel> for Cursors {
    fn from(model: CursorsPersistentModel) -> Self {
        Cursors::new(model.quantum_cursor, model.result_cursor)
    }
}

/// Quanta sequenced or received whose append has not completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuantaPersistentModel {
    pub quanta: Vec<Quantum>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{QuantumRequest, ZERO_HASH};

    fn quantum(apex: u64, request_id: u64) -> Quantum {
        Quantum {
            apex,
            prev_hash: ZERO_HASH,
            request: QuantumRequest {
                account: [9; 32],
                request_id,
                kind: 1,
                body: vec![1, 2],
            },
            payload_hash: [3; 32],
            effects_proof: vec![4; 32],
            timestamp: 1_000,
        }
    }

    #[test]
    fn test_quantum_model_roundtrip() {
        let q = quantum(5, 1);
        let model = QuantumPersistentModel::new(&q, SignatureSet::new()).unwrap();
        assert_eq!(model.apex, 5);
        assert_eq!(model.effects, q.effects_proof);
        assert_eq!(model.into_record().unwrap().quantum, q);
    }

    #[test]
    fn test_misplaced_quantum_is_corrupt() {
        let mut model = QuantumPersistentModel::new(&quantum(5, 1), SignatureSet::new()).unwrap();
        model.apex = 6;
        assert!(matches!(model.quantum(), Err(LogError::CorruptLog { .. })));
    }

    #[test]
    fn test_account_record() {
        let mut account = AccountPersistentModel::new([9; 32]);
        account.record(&quantum(3, 10));
        account.record(&quantum(4, 11));
        assert_eq!(account.nonce, 2);
        assert_eq!(account.last_request_id, 11);
        assert_eq!(account.last_update_apex, 4);
    }

    #[test]
    fn test_cursor_conversion() {
        let cursors = Cursors::new(7, Cursors::UNBOUNDED);
        let model: CursorsPersistentModel = cursors.into();
        assert_eq!(Cursors::from(model), cursors);
    }
}
