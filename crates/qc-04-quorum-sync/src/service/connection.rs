//! # Peer Connection Record
//!
//! Identity, transport, connection state and cursor pair of one peer. Owned
//! by the `ConnectionManager`; a sync worker holds an `Arc` for one session
//! and exits when the connection's shutdown signal fires.

use crate::domain::cursor::{SyncCursor, SyncPhase};
use crate::domain::errors::SyncError;
use crate::domain::handshake::HandshakeChallenge;
use crate::ports::outbound::PeerTransport;
use parking_lot::{Mutex, RwLock};
use shared_crypto::{sign_envelope, Ed25519KeyPair};
use shared_types::{ConnectionState, Cursors, MessageEnvelope, NodeMessage, NodeState, PublicKey};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::debug;

/// Connection record for one peer.
pub struct PeerConnection {
    key: PublicKey,
    transport: Arc<dyn PeerTransport>,
    identity: Option<Arc<Ed25519KeyPair>>,
    state: RwLock<ConnectionState>,
    phase: RwLock<SyncPhase>,
    remote_state: RwLock<NodeState>,
    cursor: Mutex<SyncCursor>,
    challenge: Mutex<Option<HandshakeChallenge>>,
    wake: Notify,
    shutdown: watch::Sender<bool>,
}

impl PeerConnection {
    pub fn new(transport: Arc<dyn PeerTransport>, identity: Option<Arc<Ed25519KeyPair>>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            key: transport.peer_key(),
            transport,
            identity,
            state: RwLock::new(ConnectionState::Connected),
            phase: RwLock::new(SyncPhase::Uninitialized),
            remote_state: RwLock::new(NodeState::Init),
            cursor: Mutex::new(SyncCursor::default()),
            challenge: Mutex::new(None),
            wake: Notify::new(),
            shutdown,
        }
    }

    pub fn key(&self) -> PublicKey {
        self.key
    }

    pub fn key_hex(&self) -> String {
        hex::encode(self.key)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    pub(crate) fn set_phase(&self, phase: SyncPhase) {
        *self.phase.write() = phase;
    }

    /// Lifecycle state last reported by the peer.
    pub fn remote_state(&self) -> NodeState {
        *self.remote_state.read()
    }

    pub fn set_remote_state(&self, state: NodeState) {
        *self.remote_state.write() = state;
    }

    /// Current cursors and the generation they belong to.
    pub fn cursors(&self) -> (Cursors, u64) {
        let cursor = self.cursor.lock();
        (cursor.cursors(), cursor.generation())
    }

    /// Explicit reset. Safe mid-stream: the in-flight batch cannot advance
    /// past it and the worker recomputes its next batch from here.
    pub fn set_cursors(&self, quantum_cursor: Option<u64>, result_cursor: Option<u64>) {
        self.cursor.lock().reset(quantum_cursor, result_cursor);
        debug!(
            peer = %self.key_hex(),
            ?quantum_cursor,
            ?result_cursor,
            "[qc-04] Cursors reset"
        );
        self.wake();
    }

    pub(crate) fn advance_quanta(&self, generation: u64, apex: u64) -> bool {
        self.cursor.lock().advance_quanta(generation, apex)
    }

    pub(crate) fn advance_results(&self, generation: u64, apex: u64) -> bool {
        self.cursor.lock().advance_results(generation, apex)
    }

    pub(crate) fn set_challenge(&self, challenge: HandshakeChallenge) {
        *self.challenge.lock() = Some(challenge);
    }

    pub(crate) fn take_challenge(&self) -> Option<HandshakeChallenge> {
        self.challenge.lock().take()
    }

    pub(crate) fn mark_ready(&self) {
        *self.state.write() = ConnectionState::Ready;
        self.set_phase(SyncPhase::Syncing);
    }

    /// Send one notification envelope, signed with the node identity when
    /// one is configured.
    pub async fn send(&self, message: NodeMessage) -> Result<(), SyncError> {
        if self.is_closed() {
            return Err(SyncError::closed(&self.key));
        }
        let mut envelope = MessageEnvelope::notification(message);
        if let Some(identity) = &self.identity {
            sign_envelope(identity, &mut envelope)
                .map_err(|e| SyncError::Encoding(e.to_string()))?;
        }
        self.transport.send(envelope).await
    }

    /// Answer a request, echoing its message id.
    pub async fn respond(&self, message_id: u64, message: NodeMessage) -> Result<(), SyncError> {
        if self.is_closed() {
            return Err(SyncError::closed(&self.key));
        }
        let mut envelope = MessageEnvelope::request(message_id, message);
        if let Some(identity) = &self.identity {
            sign_envelope(identity, &mut envelope)
                .map_err(|e| SyncError::Encoding(e.to_string()))?;
        }
        self.transport.send(envelope).await
    }

    /// Wake the worker; a wake with no waiter is kept for the next wait.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub(crate) async fn notified(&self) {
        self.wake.notified().await
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Close the connection and stop its worker. Idempotent.
    pub async fn close(&self, reason: &str) {
        {
            let mut state = self.state.write();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }
        self.set_phase(SyncPhase::Uninitialized);
        self.shutdown.send_replace(true);
        self.transport.close(reason).await;
        debug!(peer = %self.key_hex(), reason, "[qc-04] Connection closed");
    }
}
