//! # Handler Configuration

use shared_types::{NodeRole, PublicKey, QuorumThreshold};

/// Role and quorum parameters, injected from node configuration.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub role: NodeRole,
    /// Known auditor public keys. Signatures from any other key are ignored.
    pub auditors: Vec<PublicKey>,
    pub threshold: QuorumThreshold,
}

impl HandlerConfig {
    pub fn prime(auditors: Vec<PublicKey>, threshold: QuorumThreshold) -> Self {
        Self {
            role: NodeRole::Prime,
            auditors,
            threshold,
        }
    }

    pub fn auditor(auditors: Vec<PublicKey>, threshold: QuorumThreshold) -> Self {
        Self {
            role: NodeRole::Auditor,
            auditors,
            threshold,
        }
    }
}
