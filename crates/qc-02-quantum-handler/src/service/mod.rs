//! # Quantum Handler Service
//!
//! Owns the chain tip. Sequencing and applying hold the tip lock across
//! "read last apex, compute next, persist", which is the system's single
//! serialization point. Events go out after the lock is released and the
//! write is durable.


use crate::domain::chain::ChainTip;
use crate::domain::config::HandlerConfig;
use crate::domain::errors::HandlerError;
use crate::domain::quorum::{FinalityTracker, QuorumPolicy};
use crate::ports::inbound::{QuantumHandlerApi, SignatureOutcome};
use crate::ports::outbound::{PayloadProcessor, QuantumStore, TimeSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::{EventPublisher, LedgerEvent};
use shared_crypto::verify_node_signature;
use shared_types::{NodeRole, Quantum, QuantumError, QuantumRequest, SignatureSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Dependencies injected into the handler.
pub struct QuantumHandlerDependencies<S, P, T> {
    pub store: S,
    pub processor: P,
    pub time_source: T,
    pub publisher: Arc<dyn EventPublisher>,
}

/// Sequencer (Prime) and validator (Auditor) of the apex chain.
pub struct QuantumHandler<S: QuantumStore, P: PayloadProcessor, T: TimeSource> {
    store: S,
    processor: P,
    time_source: T,
    publisher: Arc<dyn EventPublisher>,
    role: NodeRole,
    quorum: QuorumPolicy,
    tip: Mutex<ChainTip>,
    finality: Mutex<FinalityTracker>,
    current_apex: AtomicU64,
    last_added: AtomicU64,
}

impl<S: QuantumStore, P: PayloadProcessor, T: TimeSource> QuantumHandler<S, P, T> {
    /// Build the handler over a recovered store.
    ///
    /// `finalized` is the saved result cursor. Apexes above it are rescanned
    /// so finality survives a restart.
    pub fn new(
        deps: QuantumHandlerDependencies<S, P, T>,
        config: HandlerConfig,
        finalized: u64,
    ) -> Result<Self, HandlerError> {
        let last_apex = deps.store.last_apex()?;
        let tip = match last_apex {
            0 => ChainTip::genesis(),
            apex => {
                let (quantum, _) = deps
                    .store
                    .load_quantum(apex)?
                    .ok_or(HandlerError::UnknownApex { apex })?;
                ChainTip::at(&quantum)
            }
        };

        let quorum = QuorumPolicy::new(config.auditors, config.threshold);
        let start = finalized.min(last_apex);
        let mut finality = FinalityTracker::starting_at(start);
        for apex in start + 1..=last_apex {
            if let Some((_, signatures)) = deps.store.load_quantum(apex)? {
                if quorum.is_reached(&signatures) {
                    finality.mark(apex);
                }
            }
        }

        info!(
            role = %config.role,
            last_apex,
            finalized = finality.last_contiguous(),
            quorum = quorum.required(),
            "[qc-02] Quantum handler ready"
        );

        Ok(Self {
            store: deps.store,
            processor: deps.processor,
            time_source: deps.time_source,
            publisher: deps.publisher,
            role: config.role,
            quorum,
            tip: Mutex::new(tip),
            finality: Mutex::new(finality),
            current_apex: AtomicU64::new(last_apex),
            last_added: AtomicU64::new(last_apex),
        })
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn quorum(&self) -> &QuorumPolicy {
        &self.quorum
    }

    /// Recompute digests of `quantum` and check it extends `tip`.
    fn validate_against(&self, tip: &ChainTip, quantum: &Quantum) -> Result<(), QuantumError> {
        tip.check_successor(quantum)?;

        if quantum.payload_hash != self.processor.payload_hash(&quantum.request) {
            return Err(QuantumError::PayloadInvalid {
                apex: quantum.apex,
                reason: "payload hash does not match request".to_string(),
            });
        }
        let effects = self
            .processor
            .effects_proof(&quantum.request, quantum.apex)
            .map_err(|reason| QuantumError::PayloadInvalid {
                apex: quantum.apex,
                reason,
            })?;
        if effects != quantum.effects_proof {
            return Err(QuantumError::PayloadInvalid {
                apex: quantum.apex,
                reason: "effects proof does not match recomputation".to_string(),
            });
        }
        Ok(())
    }

    /// Split `signatures` into verified known-auditor signatures and a count
    /// of rejected ones.
    fn screen_signatures(&self, quantum: &Quantum, signatures: SignatureSet) -> (SignatureSet, usize) {
        let message = quantum.hash();
        let mut rejected = 0;
        let accepted = signatures
            .iter()
            .filter(|sig| {
                if !self.quorum.is_known(&sig.signer) {
                    debug!(
                        apex = quantum.apex,
                        signer = %hex::encode(sig.signer),
                        "[qc-02] Ignoring signature from unknown key"
                    );
                    rejected += 1;
                    return false;
                }
                if let Err(e) = verify_node_signature(&message, sig) {
                    warn!(
                        apex = quantum.apex,
                        signer = %hex::encode(sig.signer),
                        "[qc-02] Rejecting signature: {}",
                        e
                    );
                    rejected += 1;
                    return false;
                }
                true
            })
            .copied()
            .collect();
        (accepted, rejected)
    }
}

#[async_trait]
impl<S, P, T> QuantumHandlerApi for QuantumHandler<S, P, T>
where
    S: QuantumStore + 'static,
    P: PayloadProcessor + 'static,
    T: TimeSource + 'static,
{
    async fn sequence(&self, request: QuantumRequest) -> Result<Quantum, HandlerError> {
        if self.role != NodeRole::Prime {
            return Err(HandlerError::NotPrime);
        }
        let payload_hash = self.processor.payload_hash(&request);

        let quantum = {
            let mut tip = self.tip.lock();

            let durable = self.store.last_apex()?;
            if durable != tip.last_apex {
                error!(
                    tip = tip.last_apex,
                    durable, "[qc-02] Log moved under the sequencer"
                );
                return Err(QuantumError::OutOfOrder {
                    expected: tip.next_apex(),
                    actual: durable + 1,
                }
                .into());
            }

            let apex = tip.next_apex();
            let effects_proof = self
                .processor
                .effects_proof(&request, apex)
                .map_err(|reason| QuantumError::PayloadInvalid { apex, reason })?;
            let quantum = Quantum {
                apex,
                prev_hash: tip.last_hash,
                request,
                payload_hash,
                effects_proof,
                timestamp: tip.next_timestamp(self.time_source.now_millis()),
            };
            self.validate_against(&tip, &quantum)?;

            self.current_apex.store(apex, Ordering::SeqCst);
            if let Err(e) = self.store.persist(&quantum, &SignatureSet::new()) {
                self.current_apex.store(tip.last_apex, Ordering::SeqCst);
                return Err(e.into());
            }
            tip.advance(&quantum);
            self.last_added.store(apex, Ordering::SeqCst);
            quantum
        };

        debug!(
            apex = quantum.apex,
            request_id = quantum.request.request_id,
            "[qc-02] Sequenced quantum"
        );
        self.publisher
            .publish(LedgerEvent::QuantumSequenced {
                apex: quantum.apex,
                hash: quantum.hash(),
                account: quantum.request.account,
                request_id: quantum.request.request_id,
            })
            .await;
        Ok(quantum)
    }

    fn validate(&self, quantum: &Quantum) -> Result<(), HandlerError> {
        let tip = *self.tip.lock();
        self.validate_against(&tip, quantum)?;
        Ok(())
    }

    async fn apply(&self, quantum: Quantum, signatures: SignatureSet) -> Result<(), HandlerError> {
        if self.role != NodeRole::Auditor {
            return Err(HandlerError::NotAuditor);
        }
        let (accepted, _) = self.screen_signatures(&quantum, signatures);

        {
            let mut tip = self.tip.lock();
            self.validate_against(&tip, &quantum)?;
            self.current_apex.store(quantum.apex, Ordering::SeqCst);
            if let Err(e) = self.store.persist(&quantum, &accepted) {
                self.current_apex.store(tip.last_apex, Ordering::SeqCst);
                return Err(e.into());
            }
            tip.advance(&quantum);
            self.last_added.store(quantum.apex, Ordering::SeqCst);
        }

        if self.quorum.is_reached(&accepted) {
            self.finality.lock().mark(quantum.apex);
        }

        debug!(apex = quantum.apex, "[qc-02] Applied quantum");
        self.publisher
            .publish(LedgerEvent::QuantumApplied {
                apex: quantum.apex,
                hash: quantum.hash(),
            })
            .await;
        Ok(())
    }

    async fn add_signatures(
        &self,
        apex: u64,
        signatures: SignatureSet,
    ) -> Result<SignatureOutcome, HandlerError> {
        let (quantum, stored) = self
            .store
            .load_quantum(apex)?
            .ok_or(HandlerError::UnknownApex { apex })?;
        let (accepted, rejected) = self.screen_signatures(&quantum, signatures);

        let fresh = accepted.iter().filter(|s| !stored.contains(&s.signer)).count();
        let merged = if fresh > 0 {
            self.store.add_signatures(apex, &accepted)?
        } else {
            stored
        };

        let finalized = self.quorum.is_reached(&merged);
        let newly_finalized = finalized && self.finality.lock().mark(apex);

        if fresh > 0 {
            self.publisher
                .publish(LedgerEvent::SignaturesAccumulated {
                    apex,
                    signers: merged.len(),
                })
                .await;
        }
        if newly_finalized {
            info!(
                apex,
                signers = merged.len(),
                "[qc-02] Quantum reached quorum"
            );
            self.publisher
                .publish(LedgerEvent::QuantumFinalized {
                    apex,
                    hash: quantum.hash(),
                    account: quantum.request.account,
                    request_id: quantum.request.request_id,
                })
                .await;
        }

        Ok(SignatureOutcome {
            apex,
            accepted: accepted.len(),
            rejected,
            total: merged.len(),
            finalized,
            newly_finalized,
        })
    }

    fn last_added_apex(&self) -> u64 {
        self.last_added.load(Ordering::SeqCst)
    }

    fn current_apex(&self) -> u64 {
        self.current_apex.load(Ordering::SeqCst)
    }

    fn last_finalized_apex(&self) -> u64 {
        self.finality.lock().last_contiguous()
    }
}
