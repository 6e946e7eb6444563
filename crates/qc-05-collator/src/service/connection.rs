//! # Client Connection
//!
//! Client end of a connection to a node: assigns message ids, signs
//! outgoing envelopes, sends through a single-writer lock, correlates
//! responses through the collator and routes notifications.
//!
//! A submitted quantum completes in two stages: `QuantumResult` answers the
//! request once the quantum is sequenced, and `QuantumFinalized` arrives as
//! a notification once auditors reached quorum.

use crate::domain::errors::{CollatorError, CLOSE_GOING_AWAY};
use crate::domain::pending::Response;
use crate::ports::outbound::ClientTransport;
use crate::service::collator::{MessageCollator, Resolution};
use parking_lot::Mutex;
use shared_crypto::{sign_envelope, Ed25519KeyPair};
use shared_types::{
    MessageEnvelope, NodeMessage, PublicKey, QuantumFinalized, QuantumRequest, QuantumResult,
    ResultStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Buffered unsolicited messages before new ones are dropped.
const NOTIFICATION_BUFFER: usize = 256;

/// A sequenced request waiting for finality.
#[derive(Debug)]
pub struct Submission {
    pub request_id: u64,
    pub apex: u64,
    finalized: oneshot::Receiver<QuantumFinalized>,
}

impl Submission {
    /// Wait until the quantum reaches quorum.
    pub async fn finalized(self, timeout: Duration) -> Result<QuantumFinalized, CollatorError> {
        let request_id = self.request_id;
        match tokio::time::timeout(timeout, self.finalized).await {
            Ok(Ok(finalized)) => Ok(finalized),
            Ok(Err(_)) => Err(CollatorError::closed(
                CLOSE_GOING_AWAY,
                "connection closed before finality",
            )),
            Err(_) => Err(CollatorError::Timeout {
                message_id: request_id,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

pub struct ClientConnection {
    identity: Arc<Ed25519KeyPair>,
    account: PublicKey,
    writer: tokio::sync::Mutex<Arc<dyn ClientTransport>>,
    collator: Arc<MessageCollator>,
    timeout: Duration,
    next_message_id: AtomicU64,
    next_request_id: AtomicU64,
    finality: Mutex<HashMap<u64, oneshot::Sender<QuantumFinalized>>>,
    notifications: mpsc::Sender<Response>,
    closed: Mutex<Option<(u16, String)>>,
}

impl ClientConnection {
    /// Returns the connection and the receiver of unsolicited messages.
    pub fn new(
        identity: Arc<Ed25519KeyPair>,
        transport: Arc<dyn ClientTransport>,
        timeout: Duration,
    ) -> (Self, mpsc::Receiver<Response>) {
        let (notifications, receiver) = mpsc::channel(NOTIFICATION_BUFFER);
        let account = *identity.public_key().as_bytes();
        let connection = Self {
            identity,
            account,
            writer: tokio::sync::Mutex::new(transport),
            collator: Arc::new(MessageCollator::new()),
            timeout,
            next_message_id: AtomicU64::new(1),
            next_request_id: AtomicU64::new(1),
            finality: Mutex::new(HashMap::new()),
            notifications,
            closed: Mutex::new(None),
        };
        (connection, receiver)
    }

    /// Continue an account's request numbering after `last_request_id`.
    pub fn with_last_request_id(self, last_request_id: u64) -> Self {
        self.next_request_id.store(last_request_id + 1, Ordering::SeqCst);
        self
    }

    pub fn account(&self) -> PublicKey {
        self.account
    }

    pub fn collator(&self) -> &Arc<MessageCollator> {
        &self.collator
    }

    pub fn is_closed(&self) -> bool {
        self.closed.lock().is_some()
    }

    fn ensure_open(&self) -> Result<(), CollatorError> {
        match &*self.closed.lock() {
            Some((status, description)) => Err(CollatorError::closed(*status, description.clone())),
            None => Ok(()),
        }
    }

    /// Send `message` under a fresh message id and wait for the response.
    pub async fn request(&self, message: NodeMessage) -> Result<Response, CollatorError> {
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.request_with_id(message_id, message).await
    }

    /// Send `message` under `message_id` and wait for the response.
    pub async fn request_with_id(
        &self,
        message_id: u64,
        message: NodeMessage,
    ) -> Result<Response, CollatorError> {
        self.ensure_open()?;
        let kind = message.kind();
        let mut envelope = MessageEnvelope::request(message_id, message);
        sign_envelope(&self.identity, &mut envelope)
            .map_err(|e| CollatorError::Encoding(e.to_string()))?;

        let handle = self.collator.add(message_id, kind)?;
        self.collator.schedule_expiration(message_id, self.timeout);

        if let Err(e) = self.send(envelope).await {
            self.collator.cancel(message_id);
            return Err(e);
        }
        handle.wait().await
    }

    async fn send(&self, envelope: MessageEnvelope<NodeMessage>) -> Result<(), CollatorError> {
        let writer = self.writer.lock().await;
        writer.send(envelope).await
    }

    /// Submit a quantum request. Resolves once the node has sequenced it.
    pub async fn submit(&self, kind: u16, body: Vec<u8>) -> Result<Submission, CollatorError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let (sender, finalized) = oneshot::channel();
        self.finality.lock().insert(request_id, sender);

        let request = QuantumRequest {
            account: self.account,
            request_id,
            kind,
            body,
        };
        let outcome = match self.request(NodeMessage::QuantumRequest(request)).await {
            Ok(response) => match response.payload {
                NodeMessage::QuantumResult(QuantumResult {
                    status: ResultStatus::Accepted,
                    apex: Some(apex),
                    ..
                }) => Ok(apex),
                NodeMessage::QuantumResult(QuantumResult {
                    status: ResultStatus::Rejected { reason },
                    ..
                }) => Err(CollatorError::Rejected { request_id, reason }),
                other => Err(CollatorError::UnexpectedResponse(other.kind())),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(apex) => {
                debug!(request_id, apex, "[qc-05] Request sequenced");
                Ok(Submission {
                    request_id,
                    apex,
                    finalized,
                })
            }
            Err(e) => {
                self.finality.lock().remove(&request_id);
                Err(e)
            }
        }
    }

    /// Feed one incoming envelope.
    pub fn on_message(&self, envelope: Response) {
        if let Resolution::Unsolicited(envelope) = self.collator.resolve(envelope) {
            self.dispatch_notification(envelope);
        }
    }

    fn dispatch_notification(&self, envelope: Response) {
        if let NodeMessage::QuantumFinalized(finalized) = &envelope.payload {
            let waiter = self.finality.lock().remove(&finalized.request_id);
            if let Some(waiter) = waiter {
                debug!(
                    request_id = finalized.request_id,
                    apex = finalized.apex,
                    "[qc-05] Request finalized"
                );
                let _ = waiter.send(finalized.clone());
                return;
            }
        }
        if let Err(e) = self.notifications.try_send(envelope) {
            warn!("[qc-05] Dropping notification: {}", e);
        }
    }

    /// Close from the local side.
    pub async fn close(&self, status: u16, reason: &str) {
        if self.mark_closed(status, reason) {
            let writer = self.writer.lock().await;
            writer.close(status, reason).await;
        }
    }

    /// The remote side closed the connection.
    pub fn on_closed(&self, status: u16, description: &str) {
        self.mark_closed(status, description);
    }

    fn mark_closed(&self, status: u16, description: &str) -> bool {
        {
            let mut closed = self.closed.lock();
            if closed.is_some() {
                return false;
            }
            *closed = Some((status, description.to_string()));
        }
        let failed = self.collator.close_all(status, description);
        self.finality.lock().clear();
        info!(status, description, failed, "[qc-05] Connection closed");
        true
    }
}
