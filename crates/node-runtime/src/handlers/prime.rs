//! # Prime Runtime
//!
//! The sequencing node. Accepts connections from the configured auditors
//! and from clients:
//!
//! ```text
//! client ──QuantumRequest──→ handle_request ──sequence──→ Apex Log
//!                                                            │
//!        QuantumSequenced (bus) ──→ wake sync workers ───────┤
//!                                                            ▼
//! auditor ←──SyncQuantaBatch────────────────────────── sync worker
//! auditor ───QuantumSignaturesBatch──→ add_signatures ──→ quorum?
//!                                                            │
//!        QuantumFinalized (bus) ──→ notify origin client ←───┘
//!                              └──→ push signatures to auditors
//! ```
//!
//! Client finality notices ride the bus. If the router falls behind and
//! loses events, the Prime re-reads the log above the last apex it has
//! notified and notifies every quantum that reached quorum since.
//!
//! Requests of one client are handled in arrival order. Sequencing is open
//! while the node is `Ready`, independent of how many auditors are
//! connected; finality is what waits for them.

use crate::adapters::{ChainSource, Inbox};
use crate::container::NodeContainer;
use crate::container::NodeStatus;
use crate::errors::NodeError;
use crate::wiring::{spawn_router, LedgerEventSink};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use qc_02_quantum_handler::{FinalityTracker, QuantumHandlerApi, QuorumPolicy};
use qc_03_role_manager::AuditorRegistry;
use qc_04_quorum_sync::{ConnectionManager, Notifier, PeerConnection, PeerTransport, SyncConfig};
use shared_bus::{EventFilter, EventTopic, LedgerEvent};
use shared_crypto::verify_envelope;
use shared_types::{
    NodeMessage, NodeRole, PublicKey, QuantumFinalized, QuantumRequest, QuantumResult,
    ResultStatus, SignatureSet, SyncCursorReset, SyncQuantaBatch,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A running Prime.
pub struct PrimeNode {
    node: Arc<NodeContainer>,
    sync: Arc<ConnectionManager>,
    registry: Arc<AuditorRegistry>,
    notifier: Notifier,
    clients: RwLock<HashMap<PublicKey, Arc<PeerConnection>>>,
    /// Highest request id sequenced per account.
    request_ids: Mutex<HashMap<PublicKey, u64>>,
    /// Apexes whose origin client has been notified of finality.
    notified: Mutex<FinalityTracker>,
    quorum: QuorumPolicy,
    shutdown: watch::Sender<bool>,
}

impl PrimeNode {
    /// Wrap an opened Prime container and start routing its events.
    pub fn start(node: Arc<NodeContainer>) -> Result<Arc<Self>, NodeError> {
        if node.role() != NodeRole::Prime {
            return Err(NodeError::WrongRole {
                expected: NodeRole::Prime,
                actual: node.role(),
            });
        }

        let source = Arc::new(ChainSource::new(node.log.clone(), node.handler_api()));
        let sync = ConnectionManager::new(
            source,
            SyncConfig::new(node.config.sync_batch_size),
            node.bus.clone(),
        )
        .with_identity(node.identity.clone());
        let registry = AuditorRegistry::new(
            node.config.auditors.clone(),
            node.config.threshold,
            node.bus.clone(),
        );
        let request_ids = node
            .log
            .load_accounts()?
            .into_iter()
            .map(|account| (account.public_key, account.last_request_id))
            .collect::<HashMap<_, _>>();
        let notified = FinalityTracker::starting_at(node.handler.last_finalized_apex());
        let quorum = QuorumPolicy::new(node.config.auditors.clone(), node.config.threshold);
        let (shutdown, _) = watch::channel(false);

        let prime = Arc::new(Self {
            sync: Arc::new(sync),
            registry: Arc::new(registry),
            notifier: Notifier::new(node.bus.clone()),
            clients: RwLock::new(HashMap::new()),
            request_ids: Mutex::new(request_ids),
            notified: Mutex::new(notified),
            quorum,
            shutdown,
            node,
        });

        spawn_router(
            &prime.node.bus,
            EventFilter::topics(vec![
                EventTopic::Sequencing,
                EventTopic::Finality,
                EventTopic::Lifecycle,
            ]),
            prime.clone(),
            prime.shutdown.subscribe(),
        );

        info!(
            last_apex = prime.node.handler.last_added_apex(),
            finalized = prime.node.handler.last_finalized_apex(),
            auditors = prime.registry.known_count(),
            "[runtime] Prime started"
        );
        Ok(prime)
    }

    pub fn node(&self) -> &Arc<NodeContainer> {
        &self.node
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.sync
    }

    pub fn registry(&self) -> &Arc<AuditorRegistry> {
        &self.registry
    }

    /// Accept an auditor connection: send the handshake challenge and serve
    /// its messages from `inbox` until it closes.
    pub async fn connect_auditor(
        self: &Arc<Self>,
        transport: Arc<dyn PeerTransport>,
        inbox: Inbox,
    ) -> Result<Arc<PeerConnection>, NodeError> {
        let key = transport.peer_key();
        if !self.registry.is_known(&key) {
            warn!(peer = %hex::encode(key), "[qc-04] Rejecting unknown auditor");
            transport.close("unknown auditor").await;
            return Err(NodeError::UnexpectedPeer(hex::encode(key)));
        }

        let peer = self.sync.register(transport).await?;
        let this = self.clone();
        let reader = peer.clone();
        tokio::spawn(async move { this.serve_auditor(reader, inbox).await });
        Ok(peer)
    }

    async fn serve_auditor(self: Arc<Self>, peer: Arc<PeerConnection>, mut inbox: Inbox) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let envelope = tokio::select! {
                _ = shutdown.changed() => break,
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            if let Err(e) = verify_envelope(&envelope, &peer.key()) {
                warn!(peer = %peer.key_hex(), "[qc-04] Dropping unauthenticated message: {}", e);
                continue;
            }
            let kind = envelope.payload.kind();
            if let Err(e) = self.on_auditor_message(&peer, envelope.payload).await {
                warn!(peer = %peer.key_hex(), kind, "[qc-04] Auditor message failed: {}", e);
            }
            if peer.is_closed() {
                break;
            }
        }

        if self.sync.release(&peer, "auditor disconnected").await {
            self.registry.remove(&peer.key());
        }
    }

    async fn on_auditor_message(
        &self,
        peer: &Arc<PeerConnection>,
        message: NodeMessage,
    ) -> Result<(), NodeError> {
        let key = peer.key();
        match message {
            NodeMessage::AuditorHandshakeResponse(response) => {
                let cursors = self.sync.complete_handshake(&key, &response).await?;
                self.registry.update(key, response.state).await?;
                // Unfinalized quanta the auditor holds but whose signature
                // never arrived are sent again so it signs them again.
                let unsigned = self.first_unsigned(&key, cursors.quantum_cursor)?;
                if let Some(apex) = unsigned {
                    info!(
                        peer = %peer.key_hex(),
                        apex,
                        quantum_cursor = cursors.quantum_cursor,
                        "[qc-04] Auditor signature missing, rewinding"
                    );
                    self.sync.set_cursors(
                        &key,
                        &SyncCursorReset {
                            quantum_cursor: Some(apex - 1),
                            result_cursor: None,
                        },
                    )?;
                }
                // An auditor already at the tip gets no batch from its
                // worker; tell it where the tip is so it can report Ready.
                let tip = self.node.handler.last_added_apex();
                if unsigned.is_none() && cursors.quantum_cursor == tip {
                    peer.send(NodeMessage::SyncQuantaBatch(SyncQuantaBatch {
                        items: Vec::new(),
                        last_known_apex: tip,
                    }))
                    .await?;
                }
            }
            NodeMessage::QuantumSignaturesBatch(batch) => {
                for item in batch.items {
                    self.accumulate(&key, item.apex, item.signatures).await;
                }
            }
            NodeMessage::StateUpdate(update) => {
                self.registry.update(key, update.state).await?;
                self.sync.update_remote_state(&key, update.state)?;
            }
            NodeMessage::SyncCursorReset(reset) => {
                info!(
                    peer = %peer.key_hex(),
                    quantum_cursor = ?reset.quantum_cursor,
                    result_cursor = ?reset.result_cursor,
                    "[qc-04] Auditor requested cursor reset"
                );
                self.sync.set_cursors(&key, &reset)?;
            }
            other => {
                debug!(peer = %peer.key_hex(), kind = other.kind(), "[qc-04] Ignoring message from auditor");
            }
        }
        Ok(())
    }

    async fn accumulate(&self, auditor: &PublicKey, apex: u64, signatures: SignatureSet) {
        match self.node.handler.add_signatures(apex, signatures).await {
            Ok(outcome) => {
                if outcome.rejected > 0 {
                    warn!(
                        auditor = %hex::encode(auditor),
                        apex,
                        rejected = outcome.rejected,
                        "[qc-02] Discarded invalid signatures"
                    );
                }
            }
            Err(e) if e.is_fatal() => {
                self.node.state.fail(&e.to_string()).await;
            }
            Err(e) => {
                warn!(auditor = %hex::encode(auditor), apex, "[qc-02] Signatures not merged: {}", e);
            }
        }
    }

    /// First apex above the finalized prefix, up to `upto`, whose stored
    /// signatures lack `auditor`.
    fn first_unsigned(&self, auditor: &PublicKey, upto: u64) -> Result<Option<u64>, NodeError> {
        let mut from = self.node.handler.last_finalized_apex() + 1;
        while from <= upto {
            let records = self.node.log.load_quanta(from, self.node.config.sync_batch_size)?;
            if records.is_empty() {
                break;
            }
            for record in records {
                let apex = record.quantum.apex;
                if apex > upto {
                    return Ok(None);
                }
                if !record.signatures.contains(auditor) {
                    return Ok(Some(apex));
                }
                from = apex + 1;
            }
        }
        Ok(None)
    }

    /// Accept a client connection and serve its requests from `inbox`.
    pub async fn connect_client(
        self: &Arc<Self>,
        transport: Arc<dyn PeerTransport>,
        inbox: Inbox,
    ) -> Arc<PeerConnection> {
        let client = Arc::new(PeerConnection::new(
            transport,
            Some(self.node.identity.clone()),
        ));
        let previous = self.clients.write().insert(client.key(), client.clone());
        if let Some(previous) = previous {
            previous.close("replaced by a new connection").await;
        }
        debug!(client = %client.key_hex(), "[qc-05] Client connected");

        let this = self.clone();
        let reader = client.clone();
        tokio::spawn(async move { this.serve_client(reader, inbox).await });
        client
    }

    async fn serve_client(self: Arc<Self>, client: Arc<PeerConnection>, mut inbox: Inbox) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let envelope = tokio::select! {
                _ = shutdown.changed() => break,
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            if let Err(e) = verify_envelope(&envelope, &client.key()) {
                warn!(client = %client.key_hex(), "[qc-05] Dropping unauthenticated message: {}", e);
                continue;
            }
            let message_id = envelope.message_id;
            let request = match envelope.payload {
                NodeMessage::QuantumRequest(request) => request,
                other => {
                    debug!(
                        client = %client.key_hex(),
                        kind = other.kind(),
                        "[qc-05] Ignoring message from client"
                    );
                    continue;
                }
            };

            let result = self.handle_request(&client.key(), request).await;
            if message_id == 0 {
                continue;
            }
            if let Err(e) = client
                .respond(message_id, NodeMessage::QuantumResult(result))
                .await
            {
                warn!(client = %client.key_hex(), "[qc-05] Could not answer request: {}", e);
            }
        }

        {
            let mut clients = self.clients.write();
            if clients
                .get(&client.key())
                .is_some_and(|current| Arc::ptr_eq(current, &client))
            {
                clients.remove(&client.key());
            }
        }
        client.close("client disconnected").await;
    }

    /// Sequence one client request.
    ///
    /// `client` is the authenticated key of the connection. The request id
    /// is consumed before sequencing, so a request that fails to sequence
    /// cannot be replayed under the same id.
    pub async fn handle_request(&self, client: &PublicKey, request: QuantumRequest) -> QuantumResult {
        let request_id = request.request_id;
        let rejected = |reason: String| QuantumResult {
            request_id,
            apex: None,
            status: ResultStatus::Rejected { reason },
        };

        if request.account != *client {
            return rejected("account does not match the connection key".to_string());
        }
        let state = self.node.state.current();
        if !self.node.state.is_ready() {
            return rejected(format!("node is {}", state));
        }
        {
            let mut request_ids = self.request_ids.lock();
            let last = request_ids.get(client).copied().unwrap_or(0);
            if request_id <= last {
                debug!(
                    account = %hex::encode(client),
                    request_id,
                    last,
                    "[qc-05] Replayed request id"
                );
                return rejected(format!("request id {} already used", request_id));
            }
            request_ids.insert(*client, request_id);
        }

        match self.node.handler.sequence(request).await {
            Ok(quantum) => QuantumResult {
                request_id,
                apex: Some(quantum.apex),
                status: ResultStatus::Accepted,
            },
            Err(e) => {
                if e.is_fatal() {
                    self.node.state.fail(&e.to_string()).await;
                } else {
                    warn!(request_id, "[qc-02] Request not sequenced: {}", e);
                }
                rejected(e.to_string())
            }
        }
    }

    async fn notify_client(&self, account: PublicKey, finalized: QuantumFinalized) {
        let client = self.clients.read().get(&account).cloned();
        match client {
            Some(client) => {
                self.notifier
                    .broadcast(&[client], &NodeMessage::QuantumFinalized(finalized))
                    .await;
            }
            None => debug!(
                account = %hex::encode(account),
                apex = finalized.apex,
                "[qc-05] Origin client not connected"
            ),
        }
    }

    /// Notify every quorum-reached quantum above the notified prefix whose
    /// client has not heard of it. Returns how many were notified.
    async fn renotify_finalized(&self) -> Result<usize, NodeError> {
        let last = self.node.handler.last_added_apex();
        let mut from = self.notified.lock().last_contiguous() + 1;
        let mut sent = 0;
        while from <= last {
            let records = self.node.log.load_quanta(from, self.node.config.sync_batch_size)?;
            if records.is_empty() {
                break;
            }
            for record in records {
                let apex = record.quantum.apex;
                from = apex + 1;
                let fresh =
                    self.quorum.is_reached(&record.signatures) && self.notified.lock().mark(apex);
                if !fresh {
                    continue;
                }
                let finalized = QuantumFinalized {
                    request_id: record.quantum.request.request_id,
                    apex,
                    quantum_hash: record.quantum.hash(),
                };
                self.notify_client(record.quantum.request.account, finalized)
                    .await;
                sent += 1;
            }
        }
        Ok(sent)
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            connected_peers: self.sync.connected().len(),
            ready_auditors: self.registry.ready_count(),
            ..self.node.status()
        }
    }

    /// Stop every task and connection, persist cursors and release the
    /// data directory.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.sync.close_all("node shutting down").await;
        let clients: Vec<_> = self.clients.write().drain().map(|(_, c)| c).collect();
        for client in clients {
            client.close("node shutting down").await;
        }
        if let Err(e) = self.node.save_cursors() {
            warn!("[qc-01] Could not save cursors on shutdown: {}", e);
        }
        self.node.release();
        info!("[runtime] Prime stopped");
    }
}

#[async_trait]
impl LedgerEventSink for PrimeNode {
    async fn on_event(&self, event: LedgerEvent) {
        match event {
            LedgerEvent::QuantumSequenced { .. } => self.sync.wake_all(),
            LedgerEvent::QuantumFinalized {
                apex,
                hash,
                account,
                request_id,
            } => {
                self.sync.wake_all();
                if let Err(e) = self.node.save_cursors() {
                    warn!(apex, "[qc-01] Could not save cursors: {}", e);
                }
                if !self.notified.lock().mark(apex) {
                    return;
                }
                self.notify_client(
                    account,
                    QuantumFinalized {
                        request_id,
                        apex,
                        quantum_hash: hash,
                    },
                )
                .await;
            }
            LedgerEvent::AuditorStateChanged { auditor, state } => {
                info!(
                    auditor = %hex::encode(auditor),
                    %state,
                    ready = self.registry.ready_count(),
                    quorum = self.registry.has_ready_quorum(),
                    "[qc-03] Auditor state changed"
                );
            }
            _ => {}
        }
    }

    async fn on_lagged(&self, skipped: u64) {
        self.sync.wake_all();
        if let Err(e) = self.node.save_cursors() {
            warn!("[qc-01] Could not save cursors: {}", e);
        }
        match self.renotify_finalized().await {
            Ok(sent) => info!(skipped, sent, "[qc-05] Re-read finality after lost events"),
            Err(e) => warn!(skipped, "[qc-05] Could not re-read finality: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::NodeConfig;
    use shared_crypto::Ed25519KeyPair;
    use shared_types::QuorumThreshold;
    use std::time::Duration;

    fn key_of(seed: u8) -> PublicKey {
        *Ed25519KeyPair::from_seed([seed; 32]).public_key().as_bytes()
    }

    async fn prime() -> Arc<PrimeNode> {
        let config = NodeConfig::for_testing(NodeRole::Prime, [1; 32])
            .with_auditors(vec![key_of(2), key_of(3)], QuorumThreshold::Count(2));
        let node = NodeContainer::open(config).await.unwrap();
        PrimeNode::start(Arc::new(node)).unwrap()
    }

    fn request(account: PublicKey, request_id: u64) -> QuantumRequest {
        QuantumRequest {
            account,
            request_id,
            kind: 1,
            body: b"transfer".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_auditor_container_is_rejected() {
        let config = NodeConfig::for_testing(NodeRole::Auditor, [2; 32])
            .with_auditors(vec![key_of(2)], QuorumThreshold::Count(1))
            .with_prime(key_of(1));
        let node = Arc::new(NodeContainer::open(config).await.unwrap());
        assert!(matches!(
            PrimeNode::start(node),
            Err(NodeError::WrongRole { .. })
        ));
    }

    #[tokio::test]
    async fn test_requests_get_consecutive_apexes() {
        let prime = prime().await;
        let client = key_of(9);

        for (request_id, apex) in [(1, 1), (2, 2), (5, 3)] {
            let result = prime.handle_request(&client, request(client, request_id)).await;
            assert_eq!(result.status, ResultStatus::Accepted);
            assert_eq!(result.apex, Some(apex));
        }
        assert_eq!(prime.node().handler.last_added_apex(), 3);
    }

    #[tokio::test]
    async fn test_reused_request_id_is_rejected() {
        let prime = prime().await;
        let client = key_of(9);

        let first = prime.handle_request(&client, request(client, 4)).await;
        assert_eq!(first.status, ResultStatus::Accepted);

        for request_id in [4, 3, 0] {
            let replay = prime.handle_request(&client, request(client, request_id)).await;
            assert!(matches!(replay.status, ResultStatus::Rejected { .. }));
            assert_eq!(replay.apex, None);
        }
        assert_eq!(prime.node().handler.last_added_apex(), 1);
    }

    #[tokio::test]
    async fn test_request_for_other_account_is_rejected() {
        let prime = prime().await;
        let result = prime.handle_request(&key_of(9), request(key_of(8), 1)).await;
        assert!(matches!(result.status, ResultStatus::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_failed_prime_rejects_requests() {
        let prime = prime().await;
        prime.node().state.fail("test").await;
        let client = key_of(9);
        let result = prime.handle_request(&client, request(client, 1)).await;
        assert!(matches!(result.status, ResultStatus::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_unknown_auditor_is_refused() {
        let prime = prime().await;
        let (_stranger, (prime_side, inbox)) =
            crate::adapters::loopback_pair(key_of(7), key_of(1), 8);
        let err = prime
            .connect_auditor(Arc::new(prime_side), inbox)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, NodeError::UnexpectedPeer(_)));
        assert!(prime.connections().connected().is_empty());
    }

    #[tokio::test]
    async fn test_finality_lost_on_the_bus_still_reaches_the_client() {
        let mut config = NodeConfig::for_testing(NodeRole::Prime, [1; 32])
            .with_auditors(vec![key_of(2)], QuorumThreshold::Count(1));
        config.event_bus_capacity = 2;
        let node = NodeContainer::open(config).await.unwrap();
        let prime = PrimeNode::start(Arc::new(node)).unwrap();

        let client = key_of(9);
        let (_client_end, mut client_inbox) = {
            let ((client_end, client_inbox), (prime_side, prime_inbox)) =
                crate::adapters::loopback_pair(client, key_of(1), 64);
            prime.connect_client(Arc::new(prime_side), prime_inbox).await;
            (client_end, client_inbox)
        };

        // Nothing here yields, so the router only sees the tail of the bus.
        let auditor = Ed25519KeyPair::from_seed([2; 32]);
        for request_id in 1..=5 {
            let apex = prime
                .handle_request(&client, request(client, request_id))
                .await
                .apex
                .unwrap();
            let hash = prime.node().log.load_quantum(apex).unwrap().unwrap().quantum.hash();
            let signatures: SignatureSet = std::iter::once(auditor.node_signature(&hash)).collect();
            prime.node().handler.add_signatures(apex, signatures).await.unwrap();
        }

        let mut notified = Vec::new();
        while notified.len() < 5 {
            let envelope = tokio::time::timeout(Duration::from_secs(2), client_inbox.recv())
                .await
                .unwrap()
                .unwrap();
            if let NodeMessage::QuantumFinalized(notice) = envelope.payload {
                assert_eq!(notice.request_id, notice.apex);
                notified.push(notice.apex);
            }
        }
        notified.sort_unstable();
        assert_eq!(notified, vec![1, 2, 3, 4, 5]);
        // Retained events for apexes already notified are not sent twice.
        assert!(
            tokio::time::timeout(Duration::from_millis(100), client_inbox.recv())
                .await
                .is_err()
        );
    }
}
