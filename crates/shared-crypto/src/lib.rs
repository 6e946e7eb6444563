//! # Shared Crypto - Signing and Hashing Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-256 | Payload digests, effects proofs |
//! | `signatures` | Ed25519 | Auditor quantum signatures, node identity |
//! | `envelope` | Ed25519 over bincode | Envelope authentication |
//!
//! ## Security Properties
//!
//! - **Ed25519**: Deterministic nonces, no RNG dependency when signing
//! - **Key hygiene**: signing keys and seed copies are wiped on drop

#![warn(clippy::all)]

pub mod envelope;
pub mod errors;
pub mod hashing;
pub mod signatures;

// Re-exports
pub use envelope::{sign_envelope, verify_envelope};
pub use errors::CryptoError;
pub use hashing::{sha256, sha256_many, Sha256Hasher};
pub use signatures::{verify_node_signature, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
