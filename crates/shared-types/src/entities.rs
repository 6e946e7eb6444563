//! # Core Domain Entities
//!
//! Defines the apex-chain entities shared by the Prime and the Auditors.
//!
//! ## Clusters
//!
//! - **Chain**: `Quantum`, `QuantumRequest`, canonical encoding and hashing
//! - **Attestation**: `NodeSignature`, `SignatureSet`, `QuorumThreshold`
//! - **Synchronization**: `Cursors`

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// A 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// Predecessor hash of the first quantum in the chain.
pub const ZERO_HASH: Hash = [0u8; 32];

/// A client operation submitted to the Prime for sequencing.
///
/// The body is opaque to the core; its meaning belongs to the business layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumRequest {
    /// Account (client public key) that issued the request.
    pub account: PublicKey,
    /// Client-assigned request number, strictly increasing per account.
    pub request_id: u64,
    /// Business operation tag.
    pub kind: u16,
    /// Encoded business payload.
    pub body: Vec<u8>,
}

/// An immutable, ordered unit of ledger state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantum {
    /// Position in the apex chain, assigned once by the Prime.
    pub apex: u64,
    /// Hash of the previous quantum's canonical encoding.
    pub prev_hash: Hash,
    /// The request this quantum sequences.
    pub request: QuantumRequest,
    /// Digest of `request`, recomputed by every Auditor.
    pub payload_hash: Hash,
    /// Digest of the computed side effects, recomputed by every Auditor.
    pub effects_proof: Vec<u8>,
    /// Milliseconds since epoch at sequencing time. Advisory only.
    pub timestamp: i64,
}

impl Quantum {
    /// Canonical encoding used for chaining and signing.
    ///
    /// Fixed layout, big-endian: `apex | prev_hash | payload_hash |
    /// len(effects_proof) | effects_proof | timestamp`. The request body is
    /// committed to through `payload_hash`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(84 + self.effects_proof.len());
        out.extend_from_slice(&self.apex.to_be_bytes());
        out.extend_from_slice(&self.prev_hash);
        out.extend_from_slice(&self.payload_hash);
        out.extend_from_slice(&(self.effects_proof.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.effects_proof);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    /// SHA-256 of the canonical encoding.
    ///
    /// The successor's `prev_hash` and every auditor signature commit to it.
    pub fn hash(&self) -> Hash {
        Sha256::digest(self.canonical_bytes()).into()
    }

    /// Whether `self` directly follows `previous` in the chain.
    pub fn links_to(&self, previous: &Quantum) -> bool {
        self.apex == previous.apex + 1 && self.prev_hash == previous.hash()
    }
}

// =============================================================================
// CLUSTER B: ATTESTATION
// =============================================================================

/// A signature produced by a node over a quantum hash or an envelope payload.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSignature {
    /// Public key of the signer.
    pub signer: PublicKey,
    /// Ed25519 signature bytes.
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

/// Ordered set of signatures keyed by signer.
///
/// Adding is idempotent: the first signature from a signer is kept and any
/// later one from the same signer is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<NodeSignature>", into = "Vec<NodeSignature>")]
pub struct SignatureSet {
    entries: Vec<NodeSignature>,
}

impl SignatureSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a signature. Returns `false` if the signer was already present.
    pub fn insert(&mut self, signature: NodeSignature) -> bool {
        match self
            .entries
            .binary_search_by(|e| e.signer.cmp(&signature.signer))
        {
            Ok(_) => false,
            Err(pos) => {
                self.entries.insert(pos, signature);
                true
            }
        }
    }

    /// Merge another set into this one. Returns the number of new signers.
    pub fn merge(&mut self, other: &SignatureSet) -> usize {
        other.iter().filter(|sig| self.insert(**sig)).count()
    }

    /// Whether `signer` has signed.
    pub fn contains(&self, signer: &PublicKey) -> bool {
        self.entries
            .binary_search_by(|e| e.signer.cmp(signer))
            .is_ok()
    }

    /// Number of distinct signers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no signature has been collected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate signatures in signer order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeSignature> {
        self.entries.iter()
    }
}

impl From<Vec<NodeSignature>> for SignatureSet {
    fn from(signatures: Vec<NodeSignature>) -> Self {
        signatures.into_iter().collect()
    }
}

impl From<SignatureSet> for Vec<NodeSignature> {
    fn from(set: SignatureSet) -> Self {
        set.entries
    }
}

impl FromIterator<NodeSignature> for SignatureSet {
    fn from_iter<I: IntoIterator<Item = NodeSignature>>(iter: I) -> Self {
        let mut set = SignatureSet::new();
        for signature in iter {
            set.insert(signature);
        }
        set
    }
}

/// Minimum number of distinct known auditors whose signatures finalize an apex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuorumThreshold {
    /// More than half of the known auditors (`n / 2 + 1`).
    #[default]
    Majority,
    /// A fixed number of auditors.
    Count(u32),
}

impl QuorumThreshold {
    /// Number of signatures required given `auditor_count` known auditors.
    pub fn required(&self, auditor_count: usize) -> usize {
        match self {
            QuorumThreshold::Majority => auditor_count / 2 + 1,
            QuorumThreshold::Count(n) => *n as usize,
        }
    }
}

// =============================================================================
// CLUSTER C: SYNCHRONIZATION
// =============================================================================

/// Per-peer progress: last apex fully known and last apex whose signature
/// quorum is fully known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cursors {
    /// Last apex whose quantum is known.
    pub quantum_cursor: u64,
    /// Last apex whose signature quorum is known.
    pub result_cursor: u64,
}

impl Cursors {
    /// Result cursor advertised by a Prime, which never waits for results.
    pub const UNBOUNDED: u64 = u64::MAX;

    /// Create a cursor pair.
    pub fn new(quantum_cursor: u64, result_cursor: u64) -> Self {
        Self {
            quantum_cursor,
            result_cursor,
        }
    }

    /// Whether the result side is the Prime sentinel.
    pub fn is_result_unbounded(&self) -> bool {
        self.result_cursor == Self::UNBOUNDED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quantum(apex: u64, prev_hash: Hash) -> Quantum {
        Quantum {
            apex,
            prev_hash,
            request: QuantumRequest {
                account: [1u8; 32],
                request_id: apex,
                kind: 1,
                body: vec![apex as u8],
            },
            payload_hash: [apex as u8; 32],
            effects_proof: vec![0xEE; 8],
            timestamp: 1_700_000_000_000 + apex as i64,
        }
    }

    fn sig(signer: u8, fill: u8) -> NodeSignature {
        NodeSignature {
            signer: [signer; 32],
            signature: [fill; 64],
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        let q = quantum(1, ZERO_HASH);
        assert_eq!(q.hash(), q.clone().hash());
    }

    #[test]
    fn test_hash_ignores_request_body() {
        let q = quantum(1, ZERO_HASH);
        let mut other = q.clone();
        other.request.body = vec![9, 9, 9];
        // The body is committed through payload_hash, which validators recompute.
        assert_eq!(q.hash(), other.hash());
    }

    #[test]
    fn test_hash_covers_effects() {
        let q = quantum(1, ZERO_HASH);
        let mut other = q.clone();
        other.effects_proof = vec![0xAB];
        assert_ne!(q.hash(), other.hash());
    }

    #[test]
    fn test_links_to() {
        let first = quantum(1, ZERO_HASH);
        let second = quantum(2, first.hash());
        assert!(second.links_to(&first));

        let forged = quantum(2, [0xFF; 32]);
        assert!(!forged.links_to(&first));

        let gap = quantum(3, first.hash());
        assert!(!gap.links_to(&first));
    }

    #[test]
    fn test_signature_set_idempotent() {
        let mut set = SignatureSet::new();
        assert!(set.insert(sig(1, 0xAA)));
        for _ in 0..5 {
            assert!(!set.insert(sig(1, 0xAA)));
        }
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_signature_set_keeps_first_signature() {
        let mut set = SignatureSet::new();
        set.insert(sig(1, 0xAA));
        set.insert(sig(1, 0xBB));
        assert_eq!(set.iter().next().map(|s| s.signature[0]), Some(0xAA));
    }

    #[test]
    fn test_signature_set_merge() {
        let mut a: SignatureSet = vec![sig(3, 1), sig(1, 1)].into();
        let b: SignatureSet = vec![sig(1, 1), sig(2, 1)].into();

        assert_eq!(a.merge(&b), 1);
        assert_eq!(a.merge(&b), 0);

        let signers: Vec<u8> = a.iter().map(|s| s.signer[0]).collect();
        assert_eq!(signers, vec![1, 2, 3]);
    }

    #[test]
    fn test_signature_set_deserialize_normalizes() {
        let raw = vec![sig(2, 1), sig(1, 1), sig(2, 7)];
        let bytes = bincode::serialize(&raw).unwrap();
        let set: SignatureSet = bincode::deserialize(&bytes).unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.contains(&[1u8; 32]));
        assert!(set.contains(&[2u8; 32]));
    }

    #[test]
    fn test_quorum_threshold() {
        assert_eq!(QuorumThreshold::Majority.required(2), 2);
        assert_eq!(QuorumThreshold::Majority.required(3), 2);
        assert_eq!(QuorumThreshold::Majority.required(4), 3);
        assert_eq!(QuorumThreshold::Count(1).required(4), 1);
    }

    #[test]
    fn test_cursors_sentinel() {
        let prime = Cursors::new(10, Cursors::UNBOUNDED);
        assert!(prime.is_result_unbounded());
        assert!(!Cursors::default().is_result_unbounded());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn set_of(signers: &[u8]) -> SignatureSet {
            signers.iter().map(|s| sig(*s, *s)).collect::<Vec<_>>().into()
        }

        proptest! {
            #[test]
            fn test_merge_is_order_independent(
                a in proptest::collection::vec(any::<u8>(), 0..16),
                b in proptest::collection::vec(any::<u8>(), 0..16),
            ) {
                let mut ab = set_of(&a);
                ab.merge(&set_of(&b));
                let mut ba = set_of(&b);
                ba.merge(&set_of(&a));
                prop_assert_eq!(&ab, &ba);

                let mut distinct = a.clone();
                distinct.extend(&b);
                distinct.sort_unstable();
                distinct.dedup();
                prop_assert_eq!(ab.len(), distinct.len());
            }
        }
    }
}
