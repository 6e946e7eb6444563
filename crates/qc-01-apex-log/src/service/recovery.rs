//! # Startup Recovery
//!
//! ```text
//! last  = get_last_apex()
//! pend  = load_pending_quanta()      (sorted by apex)
//!
//! pend.apex <= last  → must equal the durable record → discarded
//! pend.apex == tip+1 → must link to tip and pass validation → re-appended
//! otherwise          → CorruptLog (node enters Failed)
//! ```

use super::ApexLog;
use crate::domain::errors::LogError;
use crate::domain::models::ApexRecord;
use crate::ports::outbound::KeyValueStore;
use shared_types::{Cursors, Quantum, SignatureSet, ZERO_HASH};
use tracing::{info, warn};

/// Outcome of `ApexLog::recover`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Last durable apex after recovery.
    pub last_apex: u64,
    /// Pending quanta re-validated and appended.
    pub reappended: usize,
    /// Pending quanta already durable, dropped.
    pub discarded: usize,
    /// Cursors to resume synchronization from.
    pub cursors: Cursors,
}

impl<KV: KeyValueStore> ApexLog<KV> {
    /// Complete or discard every pending quantum left by a crash.
    ///
    /// `validate` re-checks the content of each quantum that is about to be
    /// re-appended; an `Err` carries the rejection reason.
    ///
    /// # Errors
    ///
    /// `CorruptLog` if a pending quantum conflicts with the durable log, does
    /// not continue it, or fails validation.
    pub fn recover<F>(&self, mut validate: F) -> Result<RecoveryReport, LogError>
    where
        F: FnMut(&Quantum) -> Result<(), String>,
    {
        let last = self.get_last_apex()?;
        let stored_cursors = self.load_cursors()?;
        let mut pending = self.load_pending_quanta()?;
        pending.sort_by_key(|q| q.apex);

        let corrupt = |reason: String| {
            warn!("[qc-01] Recovery failed: {}", reason);
            LogError::CorruptLog { reason }
        };

        let mut tip = last;
        let mut tip_hash = match last {
            0 => ZERO_HASH,
            _ => self
                .load_quantum(last)?
                .ok_or(LogError::MissingApex { apex: last })?
                .quantum
                .hash(),
        };
        let first_available = self.first_available_apex()?;

        let mut discarded = 0;
        let mut reappend = Vec::new();
        for quantum in pending {
            if quantum.apex <= last {
                match self.load_quantum(quantum.apex)? {
                    Some(stored) if stored.quantum == quantum => discarded += 1,
                    None if quantum.apex < first_available => discarded += 1,
                    Some(_) => {
                        return Err(corrupt(format!(
                            "pending apex {} differs from the durable record",
                            quantum.apex
                        )))
                    }
                    None => {
                        return Err(corrupt(format!(
                            "durable record for apex {} is missing",
                            quantum.apex
                        )))
                    }
                }
                continue;
            }

            if quantum.apex != tip + 1 || quantum.prev_hash != tip_hash {
                return Err(corrupt(format!(
                    "pending apex {} does not continue the log at apex {}",
                    quantum.apex, tip
                )));
            }
            validate(&quantum).map_err(|reason| {
                corrupt(format!(
                    "pending apex {} failed validation: {}",
                    quantum.apex, reason
                ))
            })?;

            tip = quantum.apex;
            tip_hash = quantum.hash();
            reappend.push(ApexRecord {
                quantum,
                signatures: SignatureSet::new(),
            });
        }

        let reappended = reappend.len();
        if reappended > 0 {
            // Also clears the pending list.
            self.append_batch(&reappend)?;
        } else if discarded > 0 {
            self.clear_pending()?;
        }

        let result_cursor = if stored_cursors.is_result_unbounded() {
            stored_cursors.result_cursor
        } else {
            stored_cursors.result_cursor.min(tip)
        };
        let cursors = Cursors::new(tip, result_cursor);
        if cursors != stored_cursors {
            self.save_cursors(cursors)?;
        }

        info!(
            last_apex = tip,
            reappended,
            discarded,
            "[qc-01] Recovery complete"
        );
        Ok(RecoveryReport {
            last_apex: tip,
            reappended,
            discarded,
            cursors,
        })
    }
}
