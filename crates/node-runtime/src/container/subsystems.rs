//! # Node Container
//!
//! Holds the subsystem instances of one node and builds them in dependency
//! order:
//!
//! ```text
//! 1. Role / State Manager (qc-03)   Init → Rising
//! 2. Data directory lock + storage engine
//! 3. Apex Log (qc-01)               open, verify tail, recover pending quanta
//! 4. Quantum Handler (qc-02)        tip and finality rebuilt from the log
//! 5. Prime only                     Rising → Ready
//! ```
//!
//! An integrity failure in steps 3-4 moves the node to `Failed` and aborts
//! startup. The Prime and Auditor runtimes wrap a container.
//!
//! ## Thread Safety
//!
//! - Subsystems are shared as `Arc`s with the runtime's tasks
//! - The lock is released explicitly by `release`, not by the last `Arc`

use crate::adapters::{check_disk_space, LogStore, NodeLog, StorageBackend};
use crate::container::config::NodeConfig;
use crate::errors::NodeError;
use parking_lot::Mutex;
use qc_01_apex_log::{ApexLog, ApexLogConfig, DatabaseLock, LogError, RecoveryReport, SettingsPersistentModel};
use qc_02_quantum_handler::{
    DigestPayloadProcessor, HandlerConfig, PayloadProcessor, QuantumHandler, QuantumHandlerApi,
    QuantumHandlerDependencies, SystemTimeSource,
};
use qc_03_role_manager::{role_behavior, LifecycleEvent, StateManager};
use serde::Serialize;
use shared_bus::InMemoryEventBus;
use shared_crypto::Ed25519KeyPair;
use shared_types::{Cursors, NodeRole, NodeState, PublicKey, Quantum};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Concrete Quantum Handler of a running node.
pub type NodeHandler = QuantumHandler<LogStore, DigestPayloadProcessor, SystemTimeSource>;

/// Snapshot of a node for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub role: String,
    pub state: String,
    pub public_key: String,
    pub last_apex: u64,
    pub last_finalized_apex: u64,
    pub first_available_apex: u64,
    /// Open node connections (auditors on the Prime, the Prime on an Auditor).
    pub connected_peers: usize,
    /// Auditors reporting `Ready`. Prime only.
    pub ready_auditors: usize,
}

/// The subsystems of one node.
pub struct NodeContainer {
    pub config: NodeConfig,
    pub identity: Arc<Ed25519KeyPair>,
    pub bus: Arc<InMemoryEventBus>,
    pub state: Arc<StateManager>,
    pub log: Arc<NodeLog>,
    pub handler: Arc<NodeHandler>,
    /// What startup recovery found.
    pub recovery: RecoveryReport,
    lock: Mutex<Option<DatabaseLock>>,
}

impl NodeContainer {
    /// Validate `config`, open and recover the log and build the handler.
    #[instrument(skip_all, fields(role = %config.role))]
    pub async fn open(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;
        let identity = Arc::new(config.identity()?);
        let bus = Arc::new(InMemoryEventBus::with_capacity(config.event_bus_capacity));
        let state = Arc::new(StateManager::new(role_behavior(config.role), bus.clone()));
        state.handle(LifecycleEvent::Start).await?;

        info!(
            public_key = %hex::encode(identity.public_key().as_bytes()),
            storage = ?config.storage,
            data_dir = %config.data_dir.display(),
            "[qc-03] Node starting"
        );

        let lock = if config.storage.is_durable() {
            let lock = DatabaseLock::acquire(&config.data_dir, config.lock_timeout())?;
            check_disk_space(&config.data_dir, config.min_free_disk_bytes);
            Some(lock)
        } else {
            None
        };

        let store = StorageBackend::open(config.storage, &config.data_dir)?;
        let processor = DigestPayloadProcessor::default();

        let log = match ApexLog::open(store, ApexLogConfig::default()) {
            Ok(log) => Arc::new(log),
            Err(e) => return Err(Self::abort(&state, e).await),
        };
        let recovery = match log.recover(|quantum| check_content(&processor, quantum)) {
            Ok(report) => report,
            Err(e) => return Err(Self::abort(&state, e).await),
        };
        if recovery.reappended > 0 || recovery.discarded > 0 {
            info!(
                reappended = recovery.reappended,
                discarded = recovery.discarded,
                last_apex = recovery.last_apex,
                "[qc-01] Pending quanta resolved"
            );
        }
        Self::record_settings(&log, &config, recovery.last_apex)?;

        let handler_config = match config.role {
            NodeRole::Prime => HandlerConfig::prime(config.auditors.clone(), config.threshold),
            NodeRole::Auditor => HandlerConfig::auditor(config.auditors.clone(), config.threshold),
        };
        // Never saved unbounded, but a damaged value must not finalize the
        // whole log.
        let finalized = if recovery.cursors.is_result_unbounded() {
            0
        } else {
            recovery.cursors.result_cursor
        };
        let handler = QuantumHandler::new(
            QuantumHandlerDependencies {
                store: LogStore::new(log.clone()),
                processor,
                time_source: SystemTimeSource,
                publisher: bus.clone(),
            },
            handler_config,
            finalized,
        );
        let handler = match handler {
            Ok(handler) => Arc::new(handler),
            Err(e) if e.is_fatal() => {
                state.fail(&e.to_string()).await;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        if state.behavior().ready_after_recovery() {
            state.handle(LifecycleEvent::CaughtUp).await?;
        }

        Ok(Self {
            config,
            identity,
            bus,
            state,
            log,
            handler,
            recovery,
            lock: Mutex::new(lock),
        })
    }

    async fn abort(state: &StateManager, err: LogError) -> NodeError {
        if err.is_fatal() {
            state.fail(&err.to_string()).await;
            NodeError::Failed(err.to_string())
        } else {
            err.into()
        }
    }

    /// Store the auditor set and threshold when they differ from the
    /// version in force, effective from the next apex.
    fn record_settings(log: &NodeLog, config: &NodeConfig, last_apex: u64) -> Result<(), LogError> {
        let settings = SettingsPersistentModel {
            apex: last_apex + 1,
            auditors: config.auditors.clone(),
            threshold: config.threshold,
            sync_batch_size: config.sync_batch_size as u32,
        };
        let current = log.load_settings(u64::MAX)?;
        let unchanged = current.as_ref().is_some_and(|c| {
            c.auditors == settings.auditors
                && c.threshold == settings.threshold
                && c.sync_batch_size == settings.sync_batch_size
        });
        if !unchanged {
            if current.is_some() {
                warn!(from_apex = settings.apex, "[qc-01] Node settings changed");
            }
            log.save_settings(&settings)?;
        }
        Ok(())
    }

    pub fn role(&self) -> NodeRole {
        self.config.role
    }

    pub fn public_key(&self) -> PublicKey {
        *self.identity.public_key().as_bytes()
    }

    /// The handler behind its API trait.
    pub fn handler_api(&self) -> Arc<dyn QuantumHandlerApi> {
        self.handler.clone()
    }

    /// Persist this node's own cursor pair.
    pub fn save_cursors(&self) -> Result<Cursors, LogError> {
        let cursors = Cursors::new(
            self.handler.last_added_apex(),
            self.handler.last_finalized_apex(),
        );
        self.log.save_cursors(cursors)?;
        Ok(cursors)
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            role: self.role().to_string(),
            state: self.state.current().to_string(),
            public_key: hex::encode(self.public_key()),
            last_apex: self.handler.last_added_apex(),
            last_finalized_apex: self.handler.last_finalized_apex(),
            first_available_apex: self.log.first_available_apex().unwrap_or(0),
            connected_peers: 0,
            ready_auditors: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state.current() == NodeState::Failed
    }

    /// Release the data directory lock. Called on shutdown; the log must
    /// not be written afterwards.
    pub fn release(&self) {
        if self.lock.lock().take().is_some() {
            info!(data_dir = %self.config.data_dir.display(), "[qc-01] Data directory released");
        }
    }
}

/// Recompute a quantum's digests. Used to re-validate pending quanta on
/// recovery.
fn check_content(processor: &DigestPayloadProcessor, quantum: &Quantum) -> Result<(), String> {
    if processor.payload_hash(&quantum.request) != quantum.payload_hash {
        return Err("payload hash does not match request".to_string());
    }
    let effects = processor.effects_proof(&quantum.request, quantum.apex)?;
    if effects != quantum.effects_proof {
        return Err("effects proof does not match recomputation".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::config::StorageKind;
    use qc_02_quantum_handler::QuantumHandlerApi;
    use shared_types::{QuantumRequest, QuorumThreshold, ZERO_HASH};
    use tempfile::tempdir;

    fn key_of(seed: u8) -> PublicKey {
        *Ed25519KeyPair::from_seed([seed; 32]).public_key().as_bytes()
    }

    fn prime_config() -> NodeConfig {
        NodeConfig::for_testing(NodeRole::Prime, [1; 32])
            .with_auditors(vec![key_of(2), key_of(3)], QuorumThreshold::Count(2))
    }

    fn request(request_id: u64) -> QuantumRequest {
        QuantumRequest {
            account: key_of(9),
            request_id,
            kind: 1,
            body: vec![request_id as u8],
        }
    }

    fn valid_quantum(apex: u64, prev_hash: [u8; 32]) -> Quantum {
        let processor = DigestPayloadProcessor::default();
        let request = request(apex);
        Quantum {
            apex,
            prev_hash,
            payload_hash: processor.payload_hash(&request),
            effects_proof: processor.effects_proof(&request, apex).unwrap(),
            request,
            timestamp: apex as i64,
        }
    }

    #[tokio::test]
    async fn test_prime_is_ready_after_open() {
        let node = NodeContainer::open(prime_config()).await.unwrap();
        assert_eq!(node.state.current(), NodeState::Ready);
        assert_eq!(node.handler.last_added_apex(), 0);
        assert_eq!(node.status().role, "prime");
    }

    #[tokio::test]
    async fn test_auditor_stays_rising_after_open() {
        let config = NodeConfig::for_testing(NodeRole::Auditor, [2; 32])
            .with_auditors(vec![key_of(2), key_of(3)], QuorumThreshold::Count(2))
            .with_prime(key_of(1));
        let node = NodeContainer::open(config).await.unwrap();
        assert_eq!(node.state.current(), NodeState::Rising);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = NodeConfig::for_testing(NodeRole::Prime, [1; 32]);
        assert!(matches!(
            NodeContainer::open(config).await,
            Err(NodeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_restart_recovers_pending_quanta() {
        let dir = tempdir().unwrap();
        let config = prime_config().with_storage(StorageKind::File, dir.path());

        let first = valid_quantum(1, ZERO_HASH);
        let second = valid_quantum(2, first.hash());
        {
            let node = NodeContainer::open(config.clone()).await.unwrap();
            node.log.append(&first, &Default::default()).unwrap();
            node.log.save_pending(&[second.clone()]).unwrap();
            node.release();
        }

        let node = NodeContainer::open(config).await.unwrap();
        assert_eq!(node.recovery.reappended, 1);
        assert_eq!(node.handler.last_added_apex(), 2);
        assert_eq!(node.log.load_quantum(2).unwrap().unwrap().quantum, second);
    }

    #[tokio::test]
    async fn test_invalid_pending_quantum_fails_node() {
        let dir = tempdir().unwrap();
        let config = prime_config().with_storage(StorageKind::File, dir.path());
        {
            let node = NodeContainer::open(config.clone()).await.unwrap();
            let mut forged = valid_quantum(1, ZERO_HASH);
            forged.effects_proof = vec![0xff];
            node.log.save_pending(&[forged]).unwrap();
            node.release();
        }

        assert!(matches!(
            NodeContainer::open(config).await,
            Err(NodeError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_second_open_of_locked_directory_fails() {
        let dir = tempdir().unwrap();
        let mut config = prime_config().with_storage(StorageKind::File, dir.path());
        config.lock_timeout_ms = 50;

        let _held = NodeContainer::open(config.clone()).await.unwrap();
        assert!(matches!(
            NodeContainer::open(config).await,
            Err(NodeError::Lock(_))
        ));
    }

    #[tokio::test]
    async fn test_settings_recorded_once() {
        let dir = tempdir().unwrap();
        let config = prime_config().with_storage(StorageKind::File, dir.path());
        {
            let node = NodeContainer::open(config.clone()).await.unwrap();
            node.release();
        }
        let node = NodeContainer::open(config).await.unwrap();
        let settings = node.log.load_settings(u64::MAX).unwrap().unwrap();
        assert_eq!(settings.apex, 1);
        assert_eq!(settings.threshold, QuorumThreshold::Count(2));
    }

    #[tokio::test]
    async fn test_save_cursors_tracks_handler() {
        let node = NodeContainer::open(prime_config()).await.unwrap();
        node.handler.sequence(request(1)).await.unwrap();
        let cursors = node.save_cursors().unwrap();
        assert_eq!(cursors, Cursors::new(1, 0));
        assert_eq!(node.log.load_cursors().unwrap(), cursors);
    }
}
