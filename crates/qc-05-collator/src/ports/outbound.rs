//! # Outbound Ports (Driven Ports)

use crate::domain::errors::CollatorError;
use async_trait::async_trait;
use shared_types::{MessageEnvelope, NodeMessage};

/// Client end of a connection to a node. `ClientConnection` serializes
/// sends, so implementations see one write at a time.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    async fn send(&self, envelope: MessageEnvelope<NodeMessage>) -> Result<(), CollatorError>;

    async fn close(&self, status: u16, reason: &str);
}
