//! # Envelope Authentication
//!
//! Signs and verifies `MessageEnvelope<T>` payloads with node identity keys.

use crate::signatures::{verify_node_signature, Ed25519KeyPair};
use crate::CryptoError;
use serde::Serialize;
use shared_types::{MessageEnvelope, PublicKey};

/// Append this node's signature over the envelope payload.
pub fn sign_envelope<T: Serialize>(
    keypair: &Ed25519KeyPair,
    envelope: &mut MessageEnvelope<T>,
) -> Result<(), CryptoError> {
    let bytes = envelope
        .signing_bytes()
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    envelope.signatures.push(keypair.node_signature(&bytes));
    Ok(())
}

/// Check that `signer` produced a valid signature over the envelope payload.
pub fn verify_envelope<T: Serialize>(
    envelope: &MessageEnvelope<T>,
    signer: &PublicKey,
) -> Result<(), CryptoError> {
    let signature = envelope
        .signatures
        .iter()
        .find(|s| &s.signer == signer)
        .ok_or(CryptoError::MissingSignature)?;
    let bytes = envelope
        .signing_bytes()
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
    verify_node_signature(&bytes, signature)
}
