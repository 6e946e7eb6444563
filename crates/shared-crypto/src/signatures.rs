//! # Node Identity Keys
//!
//! Every node owns one Ed25519 key. It authenticates envelopes on the wire
//! and, on Auditors, co-signs quantum hashes. Signing is deterministic, so
//! re-signing an apex after a restart yields the identical signature.

use crate::CryptoError;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use shared_types::{NodeSignature, PublicKey};
use zeroize::Zeroizing;

/// A public key known to lie on the curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ed25519PublicKey([u8; 32]);

impl Ed25519PublicKey {
    pub fn from_bytes(bytes: PublicKey) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &PublicKey {
        &self.0
    }

    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CryptoError> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        key.verify(message, &ed25519_dalek::Signature::from_bytes(&signature.0))
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ed25519Signature([u8; 64]);

impl Ed25519Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// A node's signing identity. The secret half is wiped when dropped.
pub struct Ed25519KeyPair {
    signing_key: SigningKey,
}

impl Ed25519KeyPair {
    /// Fresh random identity.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Identity from seed bytes of unchecked length (configuration, files).
    pub fn from_seed_slice(seed: &[u8]) -> Result<Self, CryptoError> {
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(seed.try_into().map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: seed.len(),
            }
        })?);
        Ok(Self::from_seed(*seed))
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(message).to_bytes())
    }

    /// Sign `message` and tag the signature with this node's key, the form
    /// stored in signature sets and envelopes.
    pub fn node_signature(&self, message: &[u8]) -> NodeSignature {
        NodeSignature {
            signer: *self.public_key().as_bytes(),
            signature: *self.sign(message).as_bytes(),
        }
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519KeyPair")
            .field("public_key", &hex::encode(self.public_key().as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Verify a `NodeSignature` over `message` against the key it names.
pub fn verify_node_signature(message: &[u8], signature: &NodeSignature) -> Result<(), CryptoError> {
    Ed25519PublicKey::from_bytes(signature.signer)?
        .verify(message, &Ed25519Signature::from_bytes(signature.signature))
}
