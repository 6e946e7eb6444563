//! # Message Envelope
//!
//! Binary envelope wrapping every message exchanged between nodes and clients.
//!
//! - **Correlation**: `message_id` is assigned per request by the sender and
//!   echoed by the responder. `0` marks a notification.
//! - **Authentication**: zero or more signatures over the canonical bincode
//!   encoding of the payload.

use crate::entities::NodeSignature;
use crate::errors::EncodingError;
use serde::{Deserialize, Serialize};

/// The envelope for all node and client traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    /// Request identifier. `NOTIFICATION_ID` means no response is expected.
    pub message_id: u64,
    /// The typed payload.
    pub payload: T,
    /// Signatures over `signing_bytes()`.
    pub signatures: Vec<NodeSignature>,
}

impl<T> MessageEnvelope<T> {
    /// Identifier carried by unsolicited messages.
    pub const NOTIFICATION_ID: u64 = 0;

    /// Wrap a payload that expects no response.
    pub fn notification(payload: T) -> Self {
        Self::request(Self::NOTIFICATION_ID, payload)
    }

    /// Wrap a payload under `message_id`. Responses reuse the request's id.
    pub fn request(message_id: u64, payload: T) -> Self {
        Self {
            message_id,
            payload,
            signatures: Vec::new(),
        }
    }

    /// Whether this envelope carries no correlation id.
    pub fn is_notification(&self) -> bool {
        self.message_id == Self::NOTIFICATION_ID
    }
}

impl<T: Serialize> MessageEnvelope<T> {
    /// Canonical bytes covered by envelope signatures.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        bincode::serialize(&self.payload).map_err(|e| EncodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_id() {
        let env = MessageEnvelope::notification("ping".to_string());
        assert!(env.is_notification());

        let req = MessageEnvelope::request(7, "ping".to_string());
        assert!(!req.is_notification());
        assert_eq!(req.message_id, 7);
    }

    #[test]
    fn test_signing_bytes_exclude_signatures() {
        let mut env = MessageEnvelope::request(3, vec![1u8, 2, 3]);
        let before = env.signing_bytes().unwrap();
        env.signatures.push(NodeSignature {
            signer: [1; 32],
            signature: [2; 64],
        });
        assert_eq!(before, env.signing_bytes().unwrap());
    }
}
