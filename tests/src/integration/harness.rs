//! # Scenario Harness
//!
//! Builds nodes from seeds, links them with loopback transports and
//! attaches clients. Node identities are derived from one-byte seeds:
//! the Prime is seed `1`, auditors `11..`, clients `101..`.

use node_runtime::adapters::{loopback_pair, spawn_client_reader, LoopbackLink, DEFAULT_LINK_CAPACITY};
use node_runtime::container::{NodeConfig, NodeContainer, StorageKind};
use node_runtime::handlers::{AuditorNode, PrimeNode};
use node_runtime::NodeError;
use qc_05_collator::{ClientConnection, Response};
use shared_bus::{EventFilter, EventTopic, LedgerEvent, Subscription};
use shared_crypto::Ed25519KeyPair;
use shared_types::{NodeRole, PublicKey, QuorumThreshold};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const PRIME_SEED: u8 = 1;
pub const FIRST_AUDITOR_SEED: u8 = 11;
pub const FIRST_CLIENT_SEED: u8 = 101;

/// How long a scenario waits for the cluster to settle.
pub const SETTLE: Duration = Duration::from_secs(5);

pub fn identity(seed: u8) -> Ed25519KeyPair {
    Ed25519KeyPair::from_seed([seed; 32])
}

pub fn key_of(seed: u8) -> PublicKey {
    *identity(seed).public_key().as_bytes()
}

pub fn auditor_seeds(count: u8) -> Vec<u8> {
    (0..count).map(|i| FIRST_AUDITOR_SEED + i).collect()
}

/// Node layout shared by every member of one cluster.
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    pub auditors: Vec<u8>,
    pub threshold: QuorumThreshold,
    pub storage: StorageKind,
}

impl ClusterSpec {
    /// In-memory cluster with `auditors` auditors.
    pub fn new(auditors: u8, threshold: QuorumThreshold) -> Self {
        Self {
            auditors: auditor_seeds(auditors),
            threshold,
            storage: StorageKind::Memory,
        }
    }

    pub fn durable(mut self) -> Self {
        self.storage = StorageKind::File;
        self
    }

    fn auditor_keys(&self) -> Vec<PublicKey> {
        self.auditors.iter().map(|seed| key_of(*seed)).collect()
    }

    pub fn prime_config(&self, data_dir: &Path) -> NodeConfig {
        NodeConfig::for_testing(NodeRole::Prime, [PRIME_SEED; 32])
            .with_auditors(self.auditor_keys(), self.threshold)
            .with_storage(self.storage, data_dir.join("prime"))
    }

    pub fn auditor_config(&self, seed: u8, data_dir: &Path) -> NodeConfig {
        NodeConfig::for_testing(NodeRole::Auditor, [seed; 32])
            .with_auditors(self.auditor_keys(), self.threshold)
            .with_prime(key_of(PRIME_SEED))
            .with_storage(self.storage, data_dir.join(format!("auditor-{}", seed)))
    }

    pub async fn start_prime(&self, data_dir: &Path) -> Result<Arc<PrimeNode>, NodeError> {
        let node = NodeContainer::open(self.prime_config(data_dir)).await?;
        PrimeNode::start(Arc::new(node))
    }

    pub async fn start_auditor(
        &self,
        seed: u8,
        data_dir: &Path,
    ) -> Result<Arc<AuditorNode>, NodeError> {
        let node = NodeContainer::open(self.auditor_config(seed, data_dir)).await?;
        AuditorNode::start(Arc::new(node))
    }
}

/// Connect `auditor` to `prime`. Returns the Prime's end of the link;
/// closing it disconnects both sides.
pub async fn link(
    prime: &Arc<PrimeNode>,
    auditor: &Arc<AuditorNode>,
) -> Result<Arc<LoopbackLink>, NodeError> {
    let ((prime_side, prime_inbox), (auditor_side, auditor_inbox)) = loopback_pair(
        prime.node().public_key(),
        auditor.node().public_key(),
        DEFAULT_LINK_CAPACITY,
    );
    let prime_side = Arc::new(prime_side);
    auditor
        .connect_prime(Arc::new(auditor_side), auditor_inbox)
        .await?;
    prime.connect_auditor(prime_side.clone(), prime_inbox).await?;
    Ok(prime_side)
}

/// A client attached to the Prime.
pub struct Client {
    pub connection: Arc<ClientConnection>,
    pub notifications: mpsc::Receiver<Response>,
}

pub async fn connect_client(prime: &Arc<PrimeNode>, seed: u8) -> Client {
    let ((client_side, client_inbox), (prime_side, prime_inbox)) = loopback_pair(
        key_of(seed),
        prime.node().public_key(),
        DEFAULT_LINK_CAPACITY,
    );
    prime
        .connect_client(Arc::new(prime_side), prime_inbox)
        .await;
    let (connection, notifications) = ClientConnection::new(
        Arc::new(identity(seed)),
        Arc::new(client_side),
        prime.node().config.request_timeout(),
    );
    let connection = Arc::new(connection);
    spawn_client_reader(connection.clone(), client_inbox);
    Client {
        connection,
        notifications,
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Subscribe to the apexes an auditor applies.
pub fn watch_applied(auditor: &AuditorNode) -> Subscription {
    auditor
        .node()
        .bus
        .subscribe(EventFilter::topics(vec![EventTopic::Sequencing]))
}

/// Collect applied apexes until `last` arrives or `timeout` passes.
pub async fn collect_applied(subscription: &mut Subscription, last: u64, timeout: Duration) -> Vec<u64> {
    let mut apexes = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Some(event) = subscription.recv().await {
            if let LedgerEvent::QuantumApplied { apex, .. } = event {
                apexes.push(apex);
                if apex >= last {
                    break;
                }
            }
        }
    })
    .await;
    apexes
}

/// Drain every `QuantumApplied` apex currently queued on `subscription`.
pub fn drain_applied(subscription: &mut Subscription) -> Vec<u64> {
    let mut apexes = Vec::new();
    while let Ok(Some(event)) = subscription.try_recv() {
        if let LedgerEvent::QuantumApplied { apex, .. } = event {
            apexes.push(apex);
        }
    }
    apexes
}
