//! # Auditor Runtime
//!
//! Keeps a replica of the Prime's log, validates every quantum, co-signs it
//! and returns the signature:
//!
//! ```text
//! Prime ──HandshakeRequest──────→ answer with (last apex, finalized, state)
//! Prime ──SyncQuantaBatch───────→ pending → apply → sign → clear pending
//!       ←─QuantumSignaturesBatch─┘
//! Prime ──QuantumSignaturesBatch→ merge → local finality
//! ```
//!
//! Quanta the node already holds are not applied again. The Prime only
//! re-sends them when it lacks this node's signature, so they are signed
//! and returned once more.
//!
//! The node stays `Rising` until a batch shows it holds the Prime's last
//! apex, then reports `Ready`. A chain mismatch asks the Prime to rewind to
//! the last local apex. A quantum that fails validation is never signed and
//! moves the node to `Failed`.

use crate::adapters::Inbox;
use crate::container::{ConfigError, NodeContainer, NodeStatus};
use crate::errors::NodeError;
use crate::wiring::{spawn_router, LedgerEventSink};
use async_trait::async_trait;
use parking_lot::RwLock;
use qc_02_quantum_handler::{HandlerError, QuantumHandlerApi};
use qc_03_role_manager::LifecycleEvent;
use qc_04_quorum_sync::{PeerConnection, PeerTransport};
use shared_bus::{EventFilter, EventTopic, LedgerEvent};
use shared_crypto::verify_envelope;
use shared_types::{
    HandshakeRequest, Hash, NodeMessage, NodeRole, NodeState, PublicKey, QuantumError,
    QuantumSignatures, QuantumSignaturesBatch, SignatureSet, StateUpdate, SyncCursorReset,
    SyncQuantaBatch, SyncQuantaBatchItem,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// A running Auditor.
pub struct AuditorNode {
    node: Arc<NodeContainer>,
    prime_key: PublicKey,
    prime: RwLock<Option<Arc<PeerConnection>>>,
    shutdown: watch::Sender<bool>,
}

impl AuditorNode {
    /// Wrap an opened Auditor container and start routing its events.
    pub fn start(node: Arc<NodeContainer>) -> Result<Arc<Self>, NodeError> {
        if node.role() != NodeRole::Auditor {
            return Err(NodeError::WrongRole {
                expected: NodeRole::Auditor,
                actual: node.role(),
            });
        }
        let prime_key = node.config.prime_key.ok_or(ConfigError::MissingPrimeKey)?;
        let (shutdown, _) = watch::channel(false);

        let auditor = Arc::new(Self {
            node,
            prime_key,
            prime: RwLock::new(None),
            shutdown,
        });
        spawn_router(
            &auditor.node.bus,
            EventFilter::topics(vec![EventTopic::Lifecycle]),
            auditor.clone(),
            auditor.shutdown.subscribe(),
        );

        info!(
            last_apex = auditor.node.handler.last_added_apex(),
            finalized = auditor.node.handler.last_finalized_apex(),
            prime = %hex::encode(prime_key),
            "[runtime] Auditor started"
        );
        Ok(auditor)
    }

    pub fn node(&self) -> &Arc<NodeContainer> {
        &self.node
    }

    /// Whether a connection to the Prime is open.
    pub fn is_connected(&self) -> bool {
        self.prime.read().as_ref().is_some_and(|p| !p.is_closed())
    }

    /// Attach the connection to the Prime and serve it from `inbox` until
    /// it closes. Replaces any previous connection.
    pub async fn connect_prime(
        self: &Arc<Self>,
        transport: Arc<dyn PeerTransport>,
        inbox: Inbox,
    ) -> Result<Arc<PeerConnection>, NodeError> {
        let key = transport.peer_key();
        if key != self.prime_key {
            warn!(peer = %hex::encode(key), "[qc-04] Rejecting connection from a node other than the Prime");
            transport.close("not the configured prime").await;
            return Err(NodeError::UnexpectedPeer(hex::encode(key)));
        }
        if self.node.state.is_failed() {
            transport.close("auditor has failed").await;
            return Err(NodeError::Failed("auditor has failed".to_string()));
        }

        let peer = Arc::new(PeerConnection::new(
            transport,
            Some(self.node.identity.clone()),
        ));
        let previous = self.prime.write().replace(peer.clone());
        if let Some(previous) = previous {
            previous.close("replaced by a new connection").await;
        }
        info!(prime = %peer.key_hex(), "[qc-04] Connected to Prime");

        let this = self.clone();
        let reader = peer.clone();
        tokio::spawn(async move { this.serve_prime(reader, inbox).await });
        Ok(peer)
    }

    async fn serve_prime(self: Arc<Self>, peer: Arc<PeerConnection>, mut inbox: Inbox) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let envelope = tokio::select! {
                _ = shutdown.changed() => break,
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            if let Err(e) = verify_envelope(&envelope, &self.prime_key) {
                warn!("[qc-04] Dropping unauthenticated message from Prime: {}", e);
                continue;
            }
            match envelope.payload {
                NodeMessage::HandshakeRequest(request) => self.answer_handshake(&peer, request).await,
                NodeMessage::SyncQuantaBatch(batch) => self.apply_batch(&peer, batch).await,
                NodeMessage::QuantumSignaturesBatch(batch) => self.merge_signatures(batch).await,
                other => {
                    debug!(kind = other.kind(), "[qc-04] Ignoring message from Prime");
                }
            }
            if peer.is_closed() {
                break;
            }
        }

        let current = {
            let mut prime = self.prime.write();
            let current = prime.as_ref().is_some_and(|p| Arc::ptr_eq(p, &peer));
            if current {
                prime.take();
            }
            current
        };
        peer.close("prime disconnected").await;
        if current && !self.node.state.is_failed() {
            info!("[qc-04] Disconnected from Prime");
            if let Err(e) = self.node.state.handle(LifecycleEvent::Disconnected).await {
                debug!("[qc-03] Disconnect not applied: {}", e);
            }
        }
    }

    async fn answer_handshake(&self, peer: &PeerConnection, request: HandshakeRequest) {
        let response = self.node.state.behavior().handshake_response(
            request.handshake_data,
            self.node.handler.last_added_apex(),
            self.node.handler.last_finalized_apex(),
            self.node.state.current(),
        );
        debug!(
            quanta_cursor = response.quanta_cursor,
            result_cursor = response.result_cursor,
            "[qc-04] Answering handshake"
        );
        if let Err(e) = peer
            .send(NodeMessage::AuditorHandshakeResponse(response))
            .await
        {
            warn!("[qc-04] Could not answer handshake: {}", e);
        }
    }

    /// Apply a batch from the Prime, sign what was applied and report
    /// progress.
    async fn apply_batch(&self, peer: &PeerConnection, batch: SyncQuantaBatch) {
        if self.node.state.is_failed() {
            warn!("[qc-02] Failed auditor ignores quanta");
            return;
        }
        let handler = &self.node.handler;
        let last_known_apex = batch.last_known_apex;
        let last = handler.last_added_apex();
        let (held, items): (Vec<_>, Vec<_>) = batch
            .items
            .into_iter()
            .partition(|item| item.quantum.apex <= last);

        let mut signed = self.sign_held(held).await;
        if !items.is_empty() {
            let quanta: Vec<_> = items.iter().map(|item| item.quantum.clone()).collect();
            if let Err(e) = self.node.log.save_pending(&quanta) {
                warn!("[qc-01] Could not record pending quanta: {}", e);
            }
        }

        for item in items {
            let apex = item.quantum.apex;
            let hash = item.quantum.hash();
            match handler.apply(item.quantum, item.signatures).await {
                Ok(()) => signed.push(self.sign_own(apex, &hash).await),
                Err(e) if e.is_resync() => {
                    self.request_resync(peer, apex, &e).await;
                    break;
                }
                Err(e @ HandlerError::Quantum(QuantumError::PayloadInvalid { .. })) => {
                    error!(apex, "[qc-02] Refusing to sign invalid quantum: {}", e);
                    self.node.state.fail(&e.to_string()).await;
                    break;
                }
                Err(e) if e.is_fatal() => {
                    self.node.state.fail(&e.to_string()).await;
                    break;
                }
                Err(e) => {
                    self.request_resync(peer, apex, &e).await;
                    break;
                }
            }
        }

        // Anything not applied above is re-sent after a rewind.
        if let Err(e) = self.node.log.clear_pending() {
            warn!("[qc-01] Could not clear pending quanta: {}", e);
        }

        if !signed.is_empty() {
            debug!(
                from = signed[0].apex,
                count = signed.len(),
                "[qc-02] Returning signatures to Prime"
            );
            if let Err(e) = peer
                .send(NodeMessage::QuantumSignaturesBatch(QuantumSignaturesBatch {
                    items: signed,
                }))
                .await
            {
                warn!("[qc-04] Could not return signatures: {}", e);
            }
        }
        self.save_cursors();

        if self.node.state.current() == NodeState::Rising
            && handler.last_added_apex() >= last_known_apex
        {
            if let Err(e) = self.node.state.handle(LifecycleEvent::CaughtUp).await {
                warn!("[qc-03] Could not mark caught up: {}", e);
            }
        }
    }

    /// Sign again quanta this node already holds. The Prime sends them
    /// again when it never received this node's signature.
    async fn sign_held(&self, items: Vec<SyncQuantaBatchItem>) -> Vec<QuantumSignatures> {
        let mut signed = Vec::with_capacity(items.len());
        for item in items {
            let apex = item.quantum.apex;
            let hash = item.quantum.hash();
            match self.node.log.load_quantum(apex) {
                Ok(Some(record)) if record.quantum.hash() == hash => {
                    signed.push(self.sign_own(apex, &hash).await);
                }
                Ok(_) => warn!(apex, "[qc-02] Re-sent quantum differs from the local log"),
                Err(e) => warn!(apex, "[qc-01] Could not load held quantum: {}", e),
            }
        }
        signed
    }

    async fn sign_own(&self, apex: u64, hash: &Hash) -> QuantumSignatures {
        let own: SignatureSet = std::iter::once(self.node.identity.node_signature(hash)).collect();
        if let Err(e) = self.node.handler.add_signatures(apex, own.clone()).await {
            warn!(apex, "[qc-02] Own signature not stored: {}", e);
        }
        QuantumSignatures {
            apex,
            signatures: own,
        }
    }

    async fn request_resync(&self, peer: &PeerConnection, apex: u64, cause: &HandlerError) {
        let from = self.node.handler.last_added_apex();
        warn!(apex, from, "[qc-04] Requesting resync: {}", cause);
        let reset = SyncCursorReset {
            quantum_cursor: Some(from),
            result_cursor: None,
        };
        if let Err(e) = peer.send(NodeMessage::SyncCursorReset(reset)).await {
            warn!("[qc-04] Could not request resync: {}", e);
        }
    }

    async fn merge_signatures(&self, batch: QuantumSignaturesBatch) {
        for item in batch.items {
            match self.node.handler.add_signatures(item.apex, item.signatures).await {
                Ok(outcome) if outcome.newly_finalized => {
                    debug!(apex = item.apex, "[qc-02] Quorum observed");
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    self.node.state.fail(&e.to_string()).await;
                    return;
                }
                Err(e) => warn!(apex = item.apex, "[qc-02] Signatures not merged: {}", e),
            }
        }
        self.save_cursors();
    }

    fn save_cursors(&self) {
        if let Err(e) = self.node.save_cursors() {
            warn!("[qc-01] Could not save cursors: {}", e);
        }
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            connected_peers: usize::from(self.is_connected()),
            ..self.node.status()
        }
    }

    /// Stop serving, persist cursors and release the data directory.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let prime = self.prime.write().take();
        if let Some(prime) = prime {
            prime.close("node shutting down").await;
        }
        self.save_cursors();
        self.node.release();
        info!("[runtime] Auditor stopped");
    }
}

#[async_trait]
impl LedgerEventSink for AuditorNode {
    async fn on_event(&self, event: LedgerEvent) {
        let LedgerEvent::NodeStateChanged { to, .. } = event else {
            return;
        };
        let prime = self.prime.read().clone();
        if let Some(prime) = prime {
            if let Err(e) = prime
                .send(NodeMessage::StateUpdate(StateUpdate { state: to }))
                .await
            {
                debug!("[qc-03] State update not delivered: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::loopback_pair;
    use crate::container::NodeConfig;
    use qc_02_quantum_handler::{DigestPayloadProcessor, PayloadProcessor};
    use shared_crypto::{sign_envelope, Ed25519KeyPair};
    use shared_types::{
        MessageEnvelope, Quantum, QuantumRequest, QuorumThreshold, ZERO_HASH,
    };
    use std::time::Duration;

    const PRIME_SEED: [u8; 32] = [1; 32];
    const AUDITOR_SEED: [u8; 32] = [2; 32];

    fn key_of(seed: [u8; 32]) -> PublicKey {
        *Ed25519KeyPair::from_seed(seed).public_key().as_bytes()
    }

    async fn auditor() -> Arc<AuditorNode> {
        let config = NodeConfig::for_testing(NodeRole::Auditor, AUDITOR_SEED)
            .with_auditors(vec![key_of(AUDITOR_SEED)], QuorumThreshold::Count(1))
            .with_prime(key_of(PRIME_SEED));
        let node = NodeContainer::open(config).await.unwrap();
        AuditorNode::start(Arc::new(node)).unwrap()
    }

    fn chain(len: u64) -> Vec<Quantum> {
        let processor = DigestPayloadProcessor::default();
        let mut prev_hash = ZERO_HASH;
        (1..=len)
            .map(|apex| {
                let request = QuantumRequest {
                    account: [9; 32],
                    request_id: apex,
                    kind: 1,
                    body: vec![apex as u8],
                };
                let quantum = Quantum {
                    apex,
                    prev_hash,
                    payload_hash: processor.payload_hash(&request),
                    effects_proof: processor.effects_proof(&request, apex).unwrap(),
                    request,
                    timestamp: apex as i64,
                };
                prev_hash = quantum.hash();
                quantum
            })
            .collect()
    }

    fn batch(quanta: &[Quantum], last_known_apex: u64) -> NodeMessage {
        NodeMessage::SyncQuantaBatch(SyncQuantaBatch {
            items: quanta
                .iter()
                .map(|quantum| SyncQuantaBatchItem {
                    quantum: quantum.clone(),
                    signatures: SignatureSet::new(),
                })
                .collect(),
            last_known_apex,
        })
    }

    struct PrimeEnd {
        identity: Ed25519KeyPair,
        link: crate::adapters::LoopbackLink,
        inbox: Inbox,
    }

    impl PrimeEnd {
        async fn send(&self, message: NodeMessage) {
            let mut envelope = MessageEnvelope::notification(message);
            sign_envelope(&self.identity, &mut envelope).unwrap();
            PeerTransport::send(&self.link, envelope).await.unwrap();
        }

        async fn recv(&mut self) -> NodeMessage {
            tokio::time::timeout(Duration::from_secs(2), self.inbox.recv())
                .await
                .unwrap()
                .unwrap()
                .payload
        }
    }

    async fn connect(auditor: &Arc<AuditorNode>) -> PrimeEnd {
        let ((link, inbox), (auditor_side, auditor_inbox)) =
            loopback_pair(key_of(PRIME_SEED), key_of(AUDITOR_SEED), 64);
        auditor
            .connect_prime(Arc::new(auditor_side), auditor_inbox)
            .await
            .unwrap();
        PrimeEnd {
            identity: Ed25519KeyPair::from_seed(PRIME_SEED),
            link,
            inbox,
        }
    }

    #[tokio::test]
    async fn test_handshake_reports_cursors_and_state() {
        let auditor = auditor().await;
        let mut prime = connect(&auditor).await;

        prime
            .send(NodeMessage::HandshakeRequest(HandshakeRequest {
                handshake_data: [5; 32],
            }))
            .await;
        match prime.recv().await {
            NodeMessage::AuditorHandshakeResponse(response) => {
                assert_eq!(response.handshake_data, [5; 32]);
                assert_eq!(response.quanta_cursor, 0);
                assert_eq!(response.state, NodeState::Rising);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_is_applied_signed_and_caught_up() {
        let auditor = auditor().await;
        let mut prime = connect(&auditor).await;
        let quanta = chain(3);

        prime.send(batch(&quanta, 3)).await;
        match prime.recv().await {
            NodeMessage::QuantumSignaturesBatch(returned) => {
                let apexes: Vec<_> = returned.items.iter().map(|i| i.apex).collect();
                assert_eq!(apexes, vec![1, 2, 3]);
                assert!(returned.items[0].signatures.contains(&key_of(AUDITOR_SEED)));
            }
            other => panic!("unexpected {:?}", other),
        }
        // The Ready transition is reported to the Prime.
        assert_eq!(
            prime.recv().await,
            NodeMessage::StateUpdate(StateUpdate {
                state: NodeState::Ready
            })
        );
        assert_eq!(auditor.node().handler.last_added_apex(), 3);
        // Quorum of one: the auditor's own signature finalizes locally.
        assert_eq!(auditor.node().handler.last_finalized_apex(), 3);
        assert!(auditor.node().log.load_pending_quanta().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resent_quanta_are_signed_again() {
        let auditor = auditor().await;
        let mut prime = connect(&auditor).await;
        let quanta = chain(3);

        prime.send(batch(&quanta, 3)).await;
        let _ = prime.recv().await;
        let _ = prime.recv().await;

        prime.send(batch(&quanta[1..], 3)).await;
        match prime.recv().await {
            NodeMessage::QuantumSignaturesBatch(returned) => {
                let apexes: Vec<_> = returned.items.iter().map(|i| i.apex).collect();
                assert_eq!(apexes, vec![2, 3]);
                assert!(returned.items[1].signatures.contains(&key_of(AUDITOR_SEED)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(auditor.node().handler.last_added_apex(), 3);
    }

    #[tokio::test]
    async fn test_resent_quantum_from_other_chain_is_not_signed() {
        let auditor = auditor().await;
        let mut prime = connect(&auditor).await;
        let quanta = chain(2);
        prime.send(batch(&quanta, 2)).await;
        let _ = prime.recv().await;
        let _ = prime.recv().await;

        let mut forged = quanta[1].clone();
        forged.timestamp += 1;
        prime.send(batch(&[forged], 2)).await;
        // Nothing is signed; the node stays Ready and sends nothing back.
        assert!(
            tokio::time::timeout(Duration::from_millis(100), prime.inbox.recv())
                .await
                .is_err()
        );
        assert_eq!(auditor.node().state.current(), NodeState::Ready);
    }

    #[tokio::test]
    async fn test_gap_requests_rewind() {
        let auditor = auditor().await;
        let mut prime = connect(&auditor).await;
        let quanta = chain(4);

        prime.send(batch(&quanta[..1], 4)).await;
        let _ = prime.recv().await;
        prime.send(batch(&quanta[2..], 4)).await;

        assert_eq!(
            prime.recv().await,
            NodeMessage::SyncCursorReset(SyncCursorReset {
                quantum_cursor: Some(1),
                result_cursor: None,
            })
        );
        assert_eq!(auditor.node().handler.last_added_apex(), 1);
        assert_eq!(auditor.node().state.current(), NodeState::Rising);
    }

    #[tokio::test]
    async fn test_invalid_quantum_fails_auditor() {
        let auditor = auditor().await;
        let prime = connect(&auditor).await;
        let mut quanta = chain(1);
        quanta[0].effects_proof = vec![0xee];

        prime.send(batch(&quanta, 1)).await;
        for _ in 0..100 {
            if auditor.node().state.is_failed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(auditor.node().state.is_failed());
        assert_eq!(auditor.node().handler.last_added_apex(), 0);
    }

    #[tokio::test]
    async fn test_connection_from_other_node_is_refused() {
        let auditor = auditor().await;
        let (_other, (auditor_side, inbox)) = loopback_pair([7; 32], key_of(AUDITOR_SEED), 8);
        assert!(matches!(
            auditor.connect_prime(Arc::new(auditor_side), inbox).await,
            Err(NodeError::UnexpectedPeer(_))
        ));
        assert!(!auditor.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_drops_back_to_rising() {
        let auditor = auditor().await;
        let mut prime = connect(&auditor).await;
        prime.send(batch(&[], 0)).await;
        assert_eq!(
            prime.recv().await,
            NodeMessage::StateUpdate(StateUpdate {
                state: NodeState::Ready
            })
        );

        PeerTransport::close(&prime.link, "bye").await;
        for _ in 0..100 {
            if auditor.node().state.current() == NodeState::Rising {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(auditor.node().state.current(), NodeState::Rising);
        assert!(!auditor.is_connected());
    }
}
