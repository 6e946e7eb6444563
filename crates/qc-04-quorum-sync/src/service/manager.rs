//! # Connection Manager
//!
//! Owns every peer connection record. Registration sends the handshake
//! challenge; a confirmed handshake seeds the cursors and starts the
//! connection's sync worker.

use crate::domain::config::SyncConfig;
use crate::domain::errors::SyncError;
use crate::domain::handshake::HandshakeChallenge;
use crate::ports::outbound::{PeerTransport, SyncSource};
use crate::service::connection::PeerConnection;
use crate::service::notifier::{BroadcastReport, Notifier};
use crate::service::worker::QuantumSyncWorker;
use parking_lot::RwLock;
use shared_bus::{EventPublisher, LedgerEvent};
use shared_crypto::Ed25519KeyPair;
use shared_types::{
    AuditorHandshakeResponse, Cursors, NodeMessage, NodeState, PublicKey, SyncCursorReset,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct ConnectionManager {
    source: Arc<dyn SyncSource>,
    config: SyncConfig,
    identity: Option<Arc<Ed25519KeyPair>>,
    publisher: Arc<dyn EventPublisher>,
    notifier: Notifier,
    peers: RwLock<HashMap<PublicKey, Arc<PeerConnection>>>,
}

impl ConnectionManager {
    pub fn new(
        source: Arc<dyn SyncSource>,
        config: SyncConfig,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            source,
            config,
            identity: None,
            notifier: Notifier::new(publisher.clone()),
            publisher,
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Sign every outgoing envelope with `identity`.
    pub fn with_identity(mut self, identity: Arc<Ed25519KeyPair>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Record a new connection and send it a handshake challenge. An
    /// existing connection from the same key is closed.
    pub async fn register(
        &self,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<Arc<PeerConnection>, SyncError> {
        let peer = Arc::new(PeerConnection::new(transport, self.identity.clone()));
        let challenge = HandshakeChallenge::generate();
        let request = challenge.request();
        peer.set_challenge(challenge);

        let previous = self.peers.write().insert(peer.key(), peer.clone());
        if let Some(previous) = previous {
            previous.close("replaced by a new connection").await;
        }

        info!(peer = %peer.key_hex(), "[qc-04] Peer connected, sending handshake");
        if let Err(e) = peer.send(NodeMessage::HandshakeRequest(request)).await {
            self.remove_if_current(&peer);
            peer.close(&e.to_string()).await;
            return Err(e);
        }
        Ok(peer)
    }

    /// Confirm the peer's echo, seed its cursors and start syncing.
    ///
    /// A failed confirmation closes the connection.
    pub async fn complete_handshake(
        &self,
        key: &PublicKey,
        response: &AuditorHandshakeResponse,
    ) -> Result<Cursors, SyncError> {
        let peer = self.peer(key).ok_or_else(|| SyncError::unknown_peer(key))?;
        let challenge = peer
            .take_challenge()
            .ok_or_else(|| SyncError::NoPendingHandshake {
                peer: peer.key_hex(),
            })?;

        let local = self.source.last_added_apex();
        let confirmed = challenge.confirm(response).and_then(|cursors| {
            if cursors.quantum_cursor > local {
                Err(SyncError::PeerAhead {
                    peer: peer.key_hex(),
                    remote: cursors.quantum_cursor,
                    local,
                })
            } else {
                Ok(cursors)
            }
        });
        let cursors = match confirmed {
            Ok(cursors) => cursors,
            Err(e) => {
                error!(peer = %peer.key_hex(), "[qc-04] Handshake failed: {}", e);
                self.disconnect(key, &e.to_string()).await;
                return Err(e);
            }
        };

        let result_cursor = if cursors.is_result_unbounded() {
            cursors.result_cursor
        } else {
            cursors.result_cursor.min(cursors.quantum_cursor)
        };
        peer.set_cursors(Some(cursors.quantum_cursor), Some(result_cursor));
        peer.set_remote_state(response.state);
        peer.mark_ready();
        info!(
            peer = %peer.key_hex(),
            quantum_cursor = cursors.quantum_cursor,
            result_cursor,
            remote_state = %response.state,
            local,
            "[qc-04] Handshake confirmed, syncing"
        );

        self.spawn_worker(peer);
        Ok(Cursors::new(cursors.quantum_cursor, result_cursor))
    }

    fn spawn_worker(&self, peer: Arc<PeerConnection>) {
        let worker = QuantumSyncWorker::new(peer.clone(), self.source.clone(), &self.config);
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                if matches!(e, SyncError::ChainMismatch { .. }) {
                    error!(peer = %peer.key_hex(), "[qc-04] Local log cannot serve sync: {}", e);
                } else {
                    warn!(peer = %peer.key_hex(), "[qc-04] Sync worker stopped: {}", e);
                }
                publisher
                    .publish(LedgerEvent::PeerSendFailed {
                        peer: peer.key(),
                        reason: e.to_string(),
                    })
                    .await;
                peer.close(&e.to_string()).await;
            }
        });
    }

    /// Apply a peer's cursor reset request.
    pub fn set_cursors(&self, key: &PublicKey, reset: &SyncCursorReset) -> Result<(), SyncError> {
        let peer = self.peer(key).ok_or_else(|| SyncError::unknown_peer(key))?;
        peer.set_cursors(reset.quantum_cursor, reset.result_cursor);
        Ok(())
    }

    /// Record the lifecycle state a peer reported.
    pub fn update_remote_state(&self, key: &PublicKey, state: NodeState) -> Result<(), SyncError> {
        let peer = self.peer(key).ok_or_else(|| SyncError::unknown_peer(key))?;
        peer.set_remote_state(state);
        Ok(())
    }

    /// Remove and close the connection for `key`. Returns whether one existed.
    pub async fn disconnect(&self, key: &PublicKey, reason: &str) -> bool {
        let removed = self.peers.write().remove(key);
        match removed {
            Some(peer) => {
                info!(peer = %peer.key_hex(), reason, "[qc-04] Peer disconnected");
                peer.close(reason).await;
                true
            }
            None => false,
        }
    }

    /// Close `peer`, removing it only if it is still the registered
    /// connection for its key. Returns whether it was.
    pub async fn release(&self, peer: &Arc<PeerConnection>, reason: &str) -> bool {
        let current = self.remove_if_current(peer);
        if current {
            info!(peer = %peer.key_hex(), reason, "[qc-04] Peer disconnected");
        }
        peer.close(reason).await;
        current
    }

    fn remove_if_current(&self, peer: &Arc<PeerConnection>) -> bool {
        let mut peers = self.peers.write();
        if peers.get(&peer.key()).is_some_and(|p| Arc::ptr_eq(p, peer)) {
            peers.remove(&peer.key());
            return true;
        }
        false
    }

    /// Wake every worker after new quanta or signatures became available.
    pub fn wake_all(&self) {
        for peer in self.peers.read().values() {
            peer.wake();
        }
    }

    pub fn peer(&self, key: &PublicKey) -> Option<Arc<PeerConnection>> {
        self.peers.read().get(key).cloned()
    }

    /// Open connections.
    pub fn connected(&self) -> Vec<Arc<PeerConnection>> {
        self.peers
            .read()
            .values()
            .filter(|p| !p.is_closed())
            .cloned()
            .collect()
    }

    /// Open connections whose peer reports `Ready`.
    pub fn ready_peers(&self) -> Vec<Arc<PeerConnection>> {
        self.connected()
            .into_iter()
            .filter(|p| p.remote_state() == NodeState::Ready)
            .collect()
    }

    /// Send `message` to every open connection.
    pub async fn broadcast(&self, message: &NodeMessage) -> BroadcastReport {
        let targets = self.connected();
        self.notifier.broadcast(&targets, message).await
    }

    /// Close every connection.
    pub async fn close_all(&self, reason: &str) {
        let peers: Vec<_> = self.peers.write().drain().map(|(_, p)| p).collect();
        for peer in peers {
            peer.close(reason).await;
        }
    }
}
