//! # Digest Payload Processor
//!
//! Treats the request body as opaque: the payload hash is SHA-256 over the
//! request fields and the effects proof is SHA-256 over the payload hash and
//! the apex. Every Auditor recomputes both.

use crate::ports::outbound::PayloadProcessor;
use shared_crypto::Sha256Hasher;
use shared_types::{Hash, QuantumRequest};

const PAYLOAD_DOMAIN: &[u8] = b"qc/payload/v1";
const EFFECTS_DOMAIN: &[u8] = b"qc/effects/v1";

/// SHA-256 based processor with a body size limit.
#[derive(Debug, Clone)]
pub struct DigestPayloadProcessor {
    max_body_len: usize,
}

impl Default for DigestPayloadProcessor {
    fn default() -> Self {
        Self {
            max_body_len: 64 * 1024,
        }
    }
}

impl DigestPayloadProcessor {
    pub fn with_max_body_len(max_body_len: usize) -> Self {
        Self { max_body_len }
    }
}

impl PayloadProcessor for DigestPayloadProcessor {
    fn payload_hash(&self, request: &QuantumRequest) -> Hash {
        let mut hasher = Sha256Hasher::new();
        hasher
            .update(PAYLOAD_DOMAIN)
            .update(&request.account)
            .update(&request.request_id.to_be_bytes())
            .update(&request.kind.to_be_bytes())
            .update(&(request.body.len() as u64).to_be_bytes())
            .update(&request.body);
        hasher.finalize()
    }

    fn effects_proof(&self, request: &QuantumRequest, apex: u64) -> Result<Vec<u8>, String> {
        if request.body.len() > self.max_body_len {
            return Err(format!(
                "body of {} bytes exceeds limit {}",
                request.body.len(),
                self.max_body_len
            ));
        }
        let mut hasher = Sha256Hasher::new();
        hasher
            .update(EFFECTS_DOMAIN)
            .update(&self.payload_hash(request))
            .update(&apex.to_be_bytes());
        Ok(hasher.finalize().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: Vec<u8>) -> QuantumRequest {
        QuantumRequest {
            account: [1; 32],
            request_id: 1,
            kind: 2,
            body,
        }
    }

    #[test]
    fn test_payload_hash_covers_body() {
        let processor = DigestPayloadProcessor::default();
        assert_ne!(
            processor.payload_hash(&request(vec![1])),
            processor.payload_hash(&request(vec![2]))
        );
    }

    #[test]
    fn test_effects_depend_on_apex() {
        let processor = DigestPayloadProcessor::default();
        let req = request(vec![1]);
        assert_ne!(
            processor.effects_proof(&req, 1).unwrap(),
            processor.effects_proof(&req, 2).unwrap()
        );
        assert_eq!(processor.effects_proof(&req, 1).unwrap().len(), 32);
    }

    #[test]
    fn test_oversized_body_rejected() {
        let processor = DigestPayloadProcessor::with_max_body_len(4);
        assert!(processor.effects_proof(&request(vec![0; 5]), 1).is_err());
    }
}
