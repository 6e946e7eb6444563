//! # Notifier
//!
//! Fan-out of one message to many connections. Each send yields its own
//! `Result`; a failing peer is logged and reported on the bus, and the loop
//! always reaches every target.

use crate::domain::errors::SyncError;
use crate::service::connection::PeerConnection;
use shared_bus::{EventPublisher, LedgerEvent};
use shared_types::{NodeMessage, PublicKey};
use std::sync::Arc;
use tracing::warn;

/// Per-target outcome of a broadcast.
pub type BroadcastReport = Vec<(PublicKey, Result<(), SyncError>)>;

pub struct Notifier {
    publisher: Arc<dyn EventPublisher>,
}

impl Notifier {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    /// Send `message` to every target.
    pub async fn broadcast(&self, targets: &[Arc<PeerConnection>], message: &NodeMessage) -> BroadcastReport {
        let mut report = Vec::with_capacity(targets.len());
        for target in targets {
            let result = target.send(message.clone()).await;
            if let Err(e) = &result {
                warn!(
                    peer = %target.key_hex(),
                    kind = message.kind(),
                    "[qc-04] Broadcast send failed: {}",
                    e
                );
                self.publisher
                    .publish(LedgerEvent::PeerSendFailed {
                        peer: target.key(),
                        reason: e.to_string(),
                    })
                    .await;
            }
            report.push((target.key(), result));
        }
        report
    }
}
