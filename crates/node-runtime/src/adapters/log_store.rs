//! # Apex Log Adapters
//!
//! Connect the Apex Log to the ports of the subsystems that read and write
//! it:
//!
//! - `LogStore`: `QuantumStore` for the Quantum Handler (qc-02)
//! - `ChainSource`: `SyncSource` for the sync workers (qc-04)

use crate::adapters::storage::StorageBackend;
use qc_01_apex_log::{ApexLog, LogError};
use qc_02_quantum_handler::{QuantumHandlerApi, QuantumStore, StoreError};
use qc_04_quorum_sync::{SyncError, SyncSource};
use shared_types::{Quantum, QuantumSignatures, SignatureSet, SyncQuantaBatchItem};
use std::sync::Arc;

/// The Apex Log as the node runs it.
pub type NodeLog = ApexLog<StorageBackend>;

fn store_error(err: LogError) -> StoreError {
    if err.is_fatal() {
        StoreError::Corrupt(err.to_string())
    } else {
        StoreError::Failure(err.to_string())
    }
}

fn sync_error(err: LogError) -> SyncError {
    match err {
        LogError::HistoryPruned {
            requested,
            first_available,
        } => SyncError::HistoryPruned {
            requested,
            first_available,
        },
        LogError::MissingApex { apex } => SyncError::ChainMismatch {
            apex,
            reason: "apex missing from the local log".to_string(),
        },
        other => SyncError::Source(other.to_string()),
    }
}

/// `QuantumStore` over the Apex Log.
#[derive(Clone)]
pub struct LogStore {
    log: Arc<NodeLog>,
}

impl LogStore {
    pub fn new(log: Arc<NodeLog>) -> Self {
        Self { log }
    }
}

impl QuantumStore for LogStore {
    fn last_apex(&self) -> Result<u64, StoreError> {
        self.log.get_last_apex().map_err(store_error)
    }

    fn load_quantum(&self, apex: u64) -> Result<Option<(Quantum, SignatureSet)>, StoreError> {
        Ok(self
            .log
            .load_quantum(apex)
            .map_err(store_error)?
            .map(|record| (record.quantum, record.signatures)))
    }

    fn persist(&self, quantum: &Quantum, signatures: &SignatureSet) -> Result<(), StoreError> {
        self.log
            .append(quantum, signatures)
            .map(|_| ())
            .map_err(|e| match e {
                // The handler checked the link; a mismatch here means the
                // durable log disagrees with the handler's tip.
                LogError::OutOfOrder { .. } | LogError::ChainMismatch { .. } => {
                    StoreError::Corrupt(e.to_string())
                }
                other => store_error(other),
            })
    }

    fn add_signatures(
        &self,
        apex: u64,
        signatures: &SignatureSet,
    ) -> Result<SignatureSet, StoreError> {
        self.log.add_signatures(apex, signatures).map_err(store_error)
    }
}

/// `SyncSource` over the Apex Log plus the handler's finality view.
pub struct ChainSource {
    log: Arc<NodeLog>,
    handler: Arc<dyn QuantumHandlerApi>,
}

impl ChainSource {
    pub fn new(log: Arc<NodeLog>, handler: Arc<dyn QuantumHandlerApi>) -> Self {
        Self { log, handler }
    }
}

impl SyncSource for ChainSource {
    fn last_added_apex(&self) -> u64 {
        self.handler.last_added_apex()
    }

    fn last_finalized_apex(&self) -> u64 {
        self.handler.last_finalized_apex()
    }

    fn load_quanta(&self, from: u64, max: usize) -> Result<Vec<SyncQuantaBatchItem>, SyncError> {
        Ok(self
            .log
            .load_quanta(from, max)
            .map_err(sync_error)?
            .into_iter()
            .map(|record| SyncQuantaBatchItem {
                quantum: record.quantum,
                signatures: record.signatures,
            })
            .collect())
    }

    fn load_signatures(&self, from: u64, max: usize) -> Result<Vec<QuantumSignatures>, SyncError> {
        Ok(self
            .log
            .load_quanta(from, max)
            .map_err(sync_error)?
            .into_iter()
            .map(|record| QuantumSignatures {
                apex: record.quantum.apex,
                signatures: record.signatures,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qc_01_apex_log::{ApexLogConfig, InMemoryKVStore};
    use shared_types::{QuantumRequest, ZERO_HASH};

    fn log() -> Arc<NodeLog> {
        Arc::new(
            ApexLog::open(
                StorageBackend::Memory(InMemoryKVStore::new()),
                ApexLogConfig::for_testing(),
            )
            .unwrap(),
        )
    }

    fn quantum(apex: u64, prev_hash: [u8; 32]) -> Quantum {
        Quantum {
            apex,
            prev_hash,
            request: QuantumRequest {
                account: [9; 32],
                request_id: apex,
                kind: 1,
                body: vec![apex as u8],
            },
            payload_hash: [apex as u8; 32],
            effects_proof: vec![],
            timestamp: apex as i64,
        }
    }

    #[test]
    fn test_log_store_persist_and_load() {
        let store = LogStore::new(log());
        let first = quantum(1, ZERO_HASH);
        store.persist(&first, &SignatureSet::new()).unwrap();

        assert_eq!(store.last_apex().unwrap(), 1);
        let (loaded, signatures) = store.load_quantum(1).unwrap().unwrap();
        assert_eq!(loaded, first);
        assert!(signatures.is_empty());
        assert!(store.load_quantum(2).unwrap().is_none());
    }

    #[test]
    fn test_log_store_broken_link_is_corrupt() {
        let store = LogStore::new(log());
        store.persist(&quantum(1, ZERO_HASH), &SignatureSet::new()).unwrap();
        let err = store
            .persist(&quantum(2, [7; 32]), &SignatureSet::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_pruned_history_maps_to_sync_error() {
        let err = sync_error(LogError::HistoryPruned {
            requested: 2,
            first_available: 10,
        });
        assert_eq!(
            err,
            SyncError::HistoryPruned {
                requested: 2,
                first_available: 10
            }
        );
        assert!(matches!(
            sync_error(LogError::MissingApex { apex: 4 }),
            SyncError::ChainMismatch { apex: 4, .. }
        ));
    }
}
