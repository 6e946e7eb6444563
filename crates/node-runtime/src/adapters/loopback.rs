//! # Loopback Transport
//!
//! In-process connection between two nodes, or between a client and a
//! node: a pair of bounded channels carrying envelopes. Implements both
//! `PeerTransport` (qc-04) and `ClientTransport` (qc-05), so a whole
//! Prime/Auditor/client deployment runs inside one process. Used by the
//! integration suite and by single-process demos; a socket transport
//! implements the same ports.
//!
//! Closing either end closes both directions. Messages already queued are
//! still delivered, then the inbox ends.

use async_trait::async_trait;
use parking_lot::Mutex;
use qc_04_quorum_sync::{PeerTransport, SyncError};
use qc_05_collator::{ClientConnection, ClientTransport, CollatorError, CLOSE_GOING_AWAY};
use shared_types::{MessageEnvelope, NodeMessage, PublicKey};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Envelope type carried by every link.
pub type Envelope = MessageEnvelope<NodeMessage>;

/// Receiving end of a link.
pub type Inbox = mpsc::Receiver<Envelope>;

/// Default per-direction queue depth.
pub const DEFAULT_LINK_CAPACITY: usize = 1024;

struct Channels {
    a_to_b: Mutex<Option<mpsc::Sender<Envelope>>>,
    b_to_a: Mutex<Option<mpsc::Sender<Envelope>>>,
    reason: Mutex<Option<String>>,
}

impl Channels {
    fn shut(&self, reason: &str) -> bool {
        let mut stored = self.reason.lock();
        if stored.is_some() {
            return false;
        }
        *stored = Some(reason.to_string());
        self.a_to_b.lock().take();
        self.b_to_a.lock().take();
        true
    }
}

/// One end of an in-process connection.
pub struct LoopbackLink {
    local: PublicKey,
    remote: PublicKey,
    channels: Arc<Channels>,
    forward: bool,
}

/// Connect `a` and `b`. Returns each side's link and inbox.
pub fn loopback_pair(
    a: PublicKey,
    b: PublicKey,
    capacity: usize,
) -> ((LoopbackLink, Inbox), (LoopbackLink, Inbox)) {
    let (a_to_b, b_inbox) = mpsc::channel(capacity);
    let (b_to_a, a_inbox) = mpsc::channel(capacity);
    let channels = Arc::new(Channels {
        a_to_b: Mutex::new(Some(a_to_b)),
        b_to_a: Mutex::new(Some(b_to_a)),
        reason: Mutex::new(None),
    });
    let side_a = LoopbackLink {
        local: a,
        remote: b,
        channels: channels.clone(),
        forward: true,
    };
    let side_b = LoopbackLink {
        local: b,
        remote: a,
        channels,
        forward: false,
    };
    ((side_a, a_inbox), (side_b, b_inbox))
}

impl LoopbackLink {
    pub fn local_key(&self) -> PublicKey {
        self.local
    }

    pub fn remote_key(&self) -> PublicKey {
        self.remote
    }

    pub fn is_closed(&self) -> bool {
        self.channels.reason.lock().is_some()
    }

    /// Why the link was closed, if it was.
    pub fn close_reason(&self) -> Option<String> {
        self.channels.reason.lock().clone()
    }

    async fn deliver(&self, envelope: Envelope) -> Result<(), String> {
        let sender = if self.forward {
            self.channels.a_to_b.lock().clone()
        } else {
            self.channels.b_to_a.lock().clone()
        };
        let sender = sender.ok_or_else(|| "link closed".to_string())?;
        sender.send(envelope).await.map_err(|_| "remote end dropped".to_string())
    }

    fn shut(&self, reason: &str) {
        if self.channels.shut(reason) {
            debug!(
                remote = %hex::encode(self.remote),
                reason,
                "[qc-04] Loopback link closed"
            );
        }
    }
}

#[async_trait]
impl PeerTransport for LoopbackLink {
    fn peer_key(&self) -> PublicKey {
        self.remote
    }

    async fn send(&self, envelope: Envelope) -> Result<(), SyncError> {
        if self.is_closed() {
            return Err(SyncError::closed(&self.remote));
        }
        self.deliver(envelope)
            .await
            .map_err(|reason| SyncError::transport(&self.remote, reason))
    }

    async fn close(&self, reason: &str) {
        self.shut(reason);
    }
}

#[async_trait]
impl ClientTransport for LoopbackLink {
    async fn send(&self, envelope: Envelope) -> Result<(), CollatorError> {
        if let Some(reason) = self.close_reason() {
            return Err(CollatorError::closed(CLOSE_GOING_AWAY, reason));
        }
        self.deliver(envelope).await.map_err(CollatorError::Transport)
    }

    async fn close(&self, _status: u16, reason: &str) {
        self.shut(reason);
    }
}

/// Feed every envelope from `inbox` to a client connection. When the link
/// ends the connection is closed, failing whatever is still pending.
pub fn spawn_client_reader(connection: Arc<ClientConnection>, mut inbox: Inbox) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = inbox.recv().await {
            connection.on_message(envelope);
        }
        connection.on_closed(CLOSE_GOING_AWAY, "link closed");
    })
}
