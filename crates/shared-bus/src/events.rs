//! # Ledger Events
//!
//! Defines all event types that flow through the shared bus.
//!
//! Events are published only after the state they describe is durable, so a
//! consumer never observes an apex the Apex Log cannot serve after a restart.

use serde::{Deserialize, Serialize};
use shared_types::entities::{Hash, PublicKey};
use shared_types::state::NodeState;

/// Subsystem identifiers used as event sources.
pub mod subsystem_ids {
    pub const RUNTIME: u8 = 0;
    pub const APEX_LOG: u8 = 1;
    pub const QUANTUM_HANDLER: u8 = 2;
    pub const ROLE_MANAGER: u8 = 3;
    pub const QUORUM_SYNC: u8 = 4;
    pub const COLLATOR: u8 = 5;
}

/// All events that can be published to the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LedgerEvent {
    // =========================================================================
    // QUANTUM HANDLER (qc-02)
    // =========================================================================
    /// The Prime sequenced and persisted a new quantum.
    /// Wakes every sync worker so live peers receive it.
    QuantumSequenced {
        apex: u64,
        hash: Hash,
        account: PublicKey,
        request_id: u64,
    },

    /// An Auditor validated and persisted a quantum received from the Prime.
    QuantumApplied { apex: u64, hash: Hash },

    /// New signatures were merged into the stored set for an apex.
    SignaturesAccumulated { apex: u64, signers: usize },

    /// An apex reached its signature quorum for the first time.
    QuantumFinalized {
        apex: u64,
        hash: Hash,
        account: PublicKey,
        request_id: u64,
    },

    // =========================================================================
    // ROLE / STATE MANAGER (qc-03)
    // =========================================================================
    /// This node changed lifecycle state.
    NodeStateChanged { from: NodeState, to: NodeState },

    /// A connected auditor reported a new lifecycle state.
    AuditorStateChanged { auditor: PublicKey, state: NodeState },

    // =========================================================================
    // QUORUM SYNC (qc-04)
    // =========================================================================
    /// A send to one peer failed. Other peers are unaffected.
    PeerSendFailed { peer: PublicKey, reason: String },

    // =========================================================================
    // CRITICAL EVENTS (DLQ)
    // =========================================================================
    /// Critical error requiring operator attention.
    CriticalError { subsystem_id: u8, error: String },
}

impl LedgerEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::QuantumSequenced { .. } | Self::QuantumApplied { .. } => EventTopic::Sequencing,
            Self::SignaturesAccumulated { .. } => EventTopic::Signatures,
            Self::QuantumFinalized { .. } => EventTopic::Finality,
            Self::NodeStateChanged { .. } | Self::AuditorStateChanged { .. } => {
                EventTopic::Lifecycle
            }
            Self::PeerSendFailed { .. } => EventTopic::Peers,
            Self::CriticalError { .. } => EventTopic::DeadLetterQueue,
        }
    }

    /// Get the originating subsystem ID.
    #[must_use]
    pub fn source_subsystem(&self) -> u8 {
        match self {
            Self::QuantumSequenced { .. }
            | Self::QuantumApplied { .. }
            | Self::SignaturesAccumulated { .. }
            | Self::QuantumFinalized { .. } => subsystem_ids::QUANTUM_HANDLER,
            Self::NodeStateChanged { .. } | Self::AuditorStateChanged { .. } => {
                subsystem_ids::ROLE_MANAGER
            }
            Self::PeerSendFailed { .. } => subsystem_ids::QUORUM_SYNC,
            Self::CriticalError { subsystem_id, .. } => *subsystem_id,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// New quanta appended to the local log.
    Sequencing,
    /// Signature accumulation progress.
    Signatures,
    /// Quorum reached.
    Finality,
    /// Node and auditor state changes.
    Lifecycle,
    /// Per-peer delivery problems.
    Peers,
    /// Dead Letter Queue for critical errors.
    DeadLetterQueue,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Source subsystems to include. Empty means all sources.
    pub source_subsystems: Vec<u8>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            source_subsystems: Vec::new(),
        }
    }

    /// Create a filter for events from specific subsystems.
    #[must_use]
    pub fn from_subsystems(subsystems: Vec<u8>) -> Self {
        Self {
            topics: Vec::new(),
            source_subsystems: subsystems,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let source_match = self.source_subsystems.is_empty()
            || self.source_subsystems.contains(&event.source_subsystem());

        topic_match && source_match
    }
}
