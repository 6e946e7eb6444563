//! # Quantum Sync Worker
//!
//! Streams quanta and finalized signatures to one peer, driven by the peer's
//! cursors.
//!
//! ```text
//! loop:
//!   quanta:     [quantum_cursor + 1 ..= last_added]      ─→ SyncQuantaBatch
//!   signatures: [result_cursor + 1 ..= last_finalized]   ─→ QuantumSignaturesBatch
//!   nothing to send → Live, wait for wake or shutdown
//! ```
//!
//! One batch is in flight at a time: the send is awaited before the next
//! batch is cut, so a slow peer only slows its own catch-up.

use crate::domain::config::SyncConfig;
use crate::domain::cursor::SyncPhase;
use crate::domain::errors::SyncError;
use crate::ports::outbound::SyncSource;
use crate::service::connection::PeerConnection;
use shared_types::{NodeMessage, QuantumSignaturesBatch, SyncQuantaBatch};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-connection sync engine.
pub struct QuantumSyncWorker {
    peer: Arc<PeerConnection>,
    source: Arc<dyn SyncSource>,
    batch_size: usize,
}

impl QuantumSyncWorker {
    pub fn new(peer: Arc<PeerConnection>, source: Arc<dyn SyncSource>, config: &SyncConfig) -> Self {
        Self {
            peer,
            source,
            batch_size: config.batch_size(),
        }
    }

    /// Run until the connection shuts down or a send fails.
    pub async fn run(self) -> Result<(), SyncError> {
        let mut shutdown = self.peer.shutdown_signal();
        info!(
            peer = %self.peer.key_hex(),
            cursors = ?self.peer.cursors().0,
            "[qc-04] Sync worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.step().await? {
                continue;
            }
            if self.peer.phase() == SyncPhase::Syncing {
                self.peer.set_phase(SyncPhase::Live);
                info!(peer = %self.peer.key_hex(), "[qc-04] Peer caught up, streaming live");
            }
            tokio::select! {
                _ = self.peer.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!(peer = %self.peer.key_hex(), "[qc-04] Sync worker stopped");
        Ok(())
    }

    /// Send at most one quanta batch and one signature batch. Returns
    /// whether anything was sent.
    pub async fn step(&self) -> Result<bool, SyncError> {
        let quanta = self.push_quanta().await?;
        let signatures = self.push_signatures().await?;
        Ok(quanta || signatures)
    }

    async fn push_quanta(&self) -> Result<bool, SyncError> {
        let (cursors, generation) = self.peer.cursors();
        let last = self.source.last_added_apex();
        if cursors.quantum_cursor >= last {
            return Ok(false);
        }

        let from = cursors.quantum_cursor + 1;
        let items = self.source.load_quanta(from, self.batch_size)?;
        let end = ensure_contiguous(from, items.iter().map(|i| i.quantum.apex))?;
        let count = items.len();

        self.peer
            .send(NodeMessage::SyncQuantaBatch(SyncQuantaBatch {
                items,
                last_known_apex: last,
            }))
            .await?;

        if self.peer.advance_quanta(generation, end) {
            debug!(peer = %self.peer.key_hex(), from, to = end, count, "[qc-04] Sent quanta batch");
        } else {
            debug!(peer = %self.peer.key_hex(), from, to = end, "[qc-04] Cursor reset during send");
        }
        Ok(true)
    }

    async fn push_signatures(&self) -> Result<bool, SyncError> {
        let (cursors, generation) = self.peer.cursors();
        if cursors.is_result_unbounded() {
            return Ok(false);
        }
        // Only apexes the peer already holds can take signatures.
        let upto = self
            .source
            .last_finalized_apex()
            .min(cursors.quantum_cursor);
        if cursors.result_cursor >= upto {
            return Ok(false);
        }

        let from = cursors.result_cursor + 1;
        let max = (upto - cursors.result_cursor).min(self.batch_size as u64) as usize;
        let items = self.source.load_signatures(from, max)?;
        let end = ensure_contiguous(from, items.iter().map(|i| i.apex))?;

        self.peer
            .send(NodeMessage::QuantumSignaturesBatch(QuantumSignaturesBatch { items }))
            .await?;

        if self.peer.advance_results(generation, end) {
            debug!(peer = %self.peer.key_hex(), from, to = end, "[qc-04] Sent signatures batch");
        }
        Ok(true)
    }
}

/// Check `apexes` is `from, from + 1, ...` and non-empty. Returns the last.
fn ensure_contiguous(from: u64, apexes: impl Iterator<Item = u64>) -> Result<u64, SyncError> {
    let mut expected = from;
    for apex in apexes {
        if apex != expected {
            return Err(SyncError::ChainMismatch {
                apex: expected,
                reason: format!("source returned apex {} out of sequence", apex),
            });
        }
        expected += 1;
    }
    if expected == from {
        return Err(SyncError::ChainMismatch {
            apex: from,
            reason: "source returned no records".to_string(),
        });
    }
    Ok(expected - 1)
}
