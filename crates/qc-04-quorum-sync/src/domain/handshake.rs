//! # Handshake
//!
//! The connecting side sends 32 random bytes. The responder echoes them with
//! its cursors and lifecycle state. A wrong echo ends the connection; it is
//! never retried.

use crate::domain::errors::SyncError;
use rand::RngCore;
use shared_types::{AuditorHandshakeResponse, Cursors, HandshakeRequest};

/// Outstanding handshake challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeChallenge {
    data: [u8; 32],
}

impl HandshakeChallenge {
    pub fn generate() -> Self {
        let mut data = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut data);
        Self { data }
    }

    pub fn from_bytes(data: [u8; 32]) -> Self {
        Self { data }
    }

    pub fn request(&self) -> HandshakeRequest {
        HandshakeRequest {
            handshake_data: self.data,
        }
    }

    /// Check the echo and return the responder's cursors.
    pub fn confirm(&self, response: &AuditorHandshakeResponse) -> Result<Cursors, SyncError> {
        if response.handshake_data != self.data {
            return Err(SyncError::HandshakeMismatch);
        }
        Ok(Cursors::new(response.quanta_cursor, response.result_cursor))
    }
}
