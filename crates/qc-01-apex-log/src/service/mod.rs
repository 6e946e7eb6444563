//! # Apex Log Service
//!
//! `ApexLog` owns the key-value store behind a read-write lock: range scans
//! for different catching-up peers run concurrently, writes are serialized
//! and every write is one atomic batch.

pub mod recovery;

use crate::domain::codec::{decode_record, encode_record};
use crate::domain::config::ApexLogConfig;
use crate::domain::errors::LogError;
use crate::domain::keys::{
    account_key, quantum_key, settings_key, KeyPrefix, CURSORS_KEY, PENDING_KEY,
    PRUNED_FLOOR_KEY,
};
use crate::domain::models::{
    AccountPersistentModel, ApexRecord, CursorsPersistentModel, PendingQuantaPersistentModel,
    QuantumPersistentModel, SettingsPersistentModel,
};
use crate::ports::outbound::{BatchOperation, KeyValueStore};
use parking_lot::RwLock;
use shared_types::{Cursors, Hash, PublicKey, Quantum, SignatureSet, ZERO_HASH};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Durable, ordered storage of the apex chain.
pub struct ApexLog<KV: KeyValueStore> {
    store: RwLock<KV>,
    config: ApexLogConfig,
}

impl<KV: KeyValueStore> ApexLog<KV> {
    /// Open the log over `store` and verify the trailing
    /// `config.verify_depth` links of the stored chain.
    ///
    /// # Errors
    ///
    /// `CorruptLog` if the stored chain does not link.
    pub fn open(store: KV, config: ApexLogConfig) -> Result<Self, LogError> {
        let log = Self {
            store: RwLock::new(store),
            config,
        };
        log.verify_chain(log.config.verify_depth)?;
        info!(
            last_apex = log.get_last_apex()?,
            first_available = log.first_available_apex()?,
            "[qc-01] Apex log opened"
        );
        Ok(log)
    }

    pub fn config(&self) -> &ApexLogConfig {
        &self.config
    }

    // =========================================================================
    // CHAIN
    // =========================================================================

    /// Last durable apex, `0` when the log is empty.
    pub fn get_last_apex(&self) -> Result<u64, LogError> {
        Self::last_apex_in(&*self.store.read())
    }

    /// First apex still retained. `1` unless history was pruned.
    pub fn first_available_apex(&self) -> Result<u64, LogError> {
        Self::pruned_floor_in(&*self.store.read())
    }

    /// Durably append one quantum with its signatures.
    ///
    /// # Errors
    ///
    /// - `OutOfOrder` if `quantum.apex != last + 1`
    /// - `ChainMismatch` if `prev_hash` does not match the stored predecessor
    pub fn append(&self, quantum: &Quantum, signatures: &SignatureSet) -> Result<u64, LogError> {
        self.append_records(std::iter::once((quantum, signatures)))
    }

    /// Append a run of sequential quanta in a single atomic batch.
    ///
    /// Returns the new last apex.
    pub fn append_batch(&self, records: &[ApexRecord]) -> Result<u64, LogError> {
        self.append_records(records.iter().map(|r| (&r.quantum, &r.signatures)))
    }

    fn append_records<'a>(
        &self,
        records: impl IntoIterator<Item = (&'a Quantum, &'a SignatureSet)>,
    ) -> Result<u64, LogError> {
        let mut store = self.store.write();
        let (start_apex, start_hash) = Self::tip_in(&*store)?;
        let (mut tip_apex, mut tip_hash) = (start_apex, start_hash);

        let mut ops = Vec::new();
        let mut accounts: HashMap<PublicKey, AccountPersistentModel> = HashMap::new();

        for (quantum, signatures) in records {
            let expected = tip_apex + 1;
            if quantum.apex != expected {
                return Err(LogError::OutOfOrder {
                    expected,
                    actual: quantum.apex,
                });
            }
            if quantum.prev_hash != tip_hash {
                return Err(LogError::ChainMismatch {
                    apex: quantum.apex,
                    reason: "prev_hash does not match the stored predecessor".to_string(),
                });
            }

            let model = QuantumPersistentModel::new(quantum, signatures.clone())?;
            ops.push(BatchOperation::put(
                quantum_key(quantum.apex),
                encode_record(&model)?,
            ));

            let owner = quantum.request.account;
            let account = match accounts.entry(owner) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(
                    Self::read_account_in(&*store, &owner)?
                        .unwrap_or_else(|| AccountPersistentModel::new(owner)),
                ),
            };
            account.record(quantum);

            tip_apex = quantum.apex;
            tip_hash = quantum.hash();
        }

        if tip_apex == start_apex {
            return Ok(tip_apex);
        }

        for account in accounts.values() {
            ops.push(BatchOperation::put(
                account_key(&account.public_key),
                encode_record(account)?,
            ));
        }

        // Pending entries made durable by this batch leave in the same write.
        if let Some(pending) = Self::read_pending_in(&*store)? {
            let remaining: Vec<Quantum> = pending
                .quanta
                .into_iter()
                .filter(|q| q.apex > tip_apex)
                .collect();
            ops.push(if remaining.is_empty() {
                BatchOperation::delete(PENDING_KEY)
            } else {
                BatchOperation::put(
                    PENDING_KEY,
                    encode_record(&PendingQuantaPersistentModel { quanta: remaining })?,
                )
            });
        }

        store.atomic_batch_write(ops)?;
        debug!(
            from = start_apex + 1,
            to = tip_apex,
            "[qc-01] Appended quanta"
        );
        Ok(tip_apex)
    }

    /// Ascending, contiguous run of at most `max_count` records starting at
    /// `from_inclusive`. Empty when `from_inclusive` is past the last apex.
    ///
    /// # Errors
    ///
    /// - `HistoryPruned` if `from_inclusive` predates retained history
    /// - `MissingApex` if the stored range has a hole
    pub fn load_quanta(
        &self,
        from_inclusive: u64,
        max_count: usize,
    ) -> Result<Vec<ApexRecord>, LogError> {
        let from = from_inclusive.max(1);
        let limit = max_count.min(self.config.max_load_batch);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let store = self.store.read();
        let floor = Self::pruned_floor_in(&*store)?;
        if from < floor {
            return Err(LogError::HistoryPruned {
                requested: from,
                first_available: floor,
            });
        }
        let last = Self::last_apex_in(&*store)?;
        if from > last {
            return Ok(Vec::new());
        }

        let wanted = (last - from + 1).min(limit as u64) as usize;
        let pairs = store.scan_from(&quantum_key(from), KeyPrefix::Quantum.as_bytes(), wanted)?;

        let mut records = Vec::with_capacity(wanted);
        let mut expected = from;
        for (key, bytes) in pairs {
            let model: QuantumPersistentModel = decode_record(&key, &bytes)?;
            if model.apex != expected {
                return Err(LogError::MissingApex { apex: expected });
            }
            records.push(model.into_record()?);
            expected += 1;
        }
        if records.len() < wanted {
            return Err(LogError::MissingApex { apex: expected });
        }
        Ok(records)
    }

    /// Single record by apex.
    pub fn load_quantum(&self, apex: u64) -> Result<Option<ApexRecord>, LogError> {
        Self::read_model_in(&*self.store.read(), apex)?
            .map(QuantumPersistentModel::into_record)
            .transpose()
    }

    /// Merge later signatures into a stored record. Existing signatures are
    /// never replaced. Returns the merged set.
    ///
    /// # Errors
    ///
    /// `NotFound` if no record exists for `apex`.
    pub fn add_signatures(
        &self,
        apex: u64,
        signatures: &SignatureSet,
    ) -> Result<SignatureSet, LogError> {
        let mut store = self.store.write();
        let mut model = Self::read_model_in(&*store, apex)?.ok_or(LogError::NotFound { apex })?;
        let added = model.signatures.merge(signatures);
        if added > 0 {
            store.put(&quantum_key(apex), &encode_record(&model)?)?;
            debug!(apex, added, total = model.signatures.len(), "[qc-01] Signatures merged");
        }
        Ok(model.signatures)
    }

    /// Drop records below `apex`. The last record is always kept so the
    /// chain can still be extended. Returns the number of records removed.
    pub fn prune_before(&self, apex: u64) -> Result<usize, LogError> {
        let mut store = self.store.write();
        let last = Self::last_apex_in(&*store)?;
        if last == 0 {
            return Ok(0);
        }
        let floor = Self::pruned_floor_in(&*store)?;
        let new_floor = apex.min(last);
        if new_floor <= floor {
            return Ok(0);
        }

        let pairs = store.scan_from(
            &quantum_key(floor),
            KeyPrefix::Quantum.as_bytes(),
            (new_floor - floor) as usize,
        )?;
        let mut ops: Vec<BatchOperation> = pairs
            .into_iter()
            .filter(|(key, _)| {
                KeyPrefix::Quantum
                    .apex_of(key)
                    .is_some_and(|a| a < new_floor)
            })
            .map(|(key, _)| BatchOperation::delete(key))
            .collect();
        let removed = ops.len();
        ops.push(BatchOperation::put(PRUNED_FLOOR_KEY, encode_record(&new_floor)?));

        store.atomic_batch_write(ops)?;
        info!(removed, first_available = new_floor, "[qc-01] Pruned history");
        Ok(removed)
    }

    /// Re-check the last `depth` links of the stored chain.
    ///
    /// # Errors
    ///
    /// `CorruptLog` on any unreadable record, hole or broken link.
    pub fn verify_chain(&self, depth: u64) -> Result<(), LogError> {
        if depth == 0 {
            return Ok(());
        }
        let store = self.store.read();
        let last = Self::last_apex_in(&*store)?;
        if last == 0 {
            return Ok(());
        }
        let floor = Self::pruned_floor_in(&*store)?;
        let span = depth.min(last.saturating_sub(floor) + 1);
        let corrupt = |reason: String| {
            warn!("[qc-01] Chain verification failed: {}", reason);
            LogError::CorruptLog { reason }
        };

        let pairs = store.scan_back_from(
            &quantum_key(last),
            KeyPrefix::Quantum.as_bytes(),
            span as usize,
        )?;

        let mut newer: Option<Quantum> = None;
        for (key, bytes) in pairs {
            let quantum = decode_record::<QuantumPersistentModel>(&key, &bytes)
                .and_then(|model| model.quantum())
                .map_err(|e| corrupt(e.to_string()))?;
            if let Some(next) = &newer {
                if !next.links_to(&quantum) {
                    return Err(corrupt(format!(
                        "apex {} does not link to apex {}",
                        next.apex, quantum.apex
                    )));
                }
            }
            newer = Some(quantum);
        }

        let oldest_expected = last + 1 - span;
        match newer {
            Some(oldest) if oldest.apex != oldest_expected => Err(corrupt(format!(
                "missing apex {} below apex {}",
                oldest_expected, oldest.apex
            ))),
            Some(oldest) if oldest.apex == 1 && oldest.prev_hash != ZERO_HASH => {
                Err(corrupt("first quantum has a non-zero predecessor".to_string()))
            }
            _ => Ok(()),
        }
    }

    // =========================================================================
    // CURSORS AND PENDING QUANTA
    // =========================================================================

    /// The node's own cursor pair, `(0, 0)` if never saved.
    pub fn load_cursors(&self) -> Result<Cursors, LogError> {
        let store = self.store.read();
        let model = match store.get(CURSORS_KEY)? {
            Some(bytes) => decode_record::<CursorsPersistentModel>(CURSORS_KEY, &bytes)?,
            None => CursorsPersistentModel::default(),
        };
        Ok(model.into())
    }

    pub fn save_cursors(&self, cursors: Cursors) -> Result<(), LogError> {
        let model = CursorsPersistentModel::from(cursors);
        self.store.write().put(CURSORS_KEY, &encode_record(&model)?)?;
        Ok(())
    }

    /// Record quanta about to be appended, replacing any previous list.
    pub fn save_pending(&self, quanta: &[Quantum]) -> Result<(), LogError> {
        let model = PendingQuantaPersistentModel {
            quanta: quanta.to_vec(),
        };
        self.store.write().put(PENDING_KEY, &encode_record(&model)?)?;
        Ok(())
    }

    /// Quanta recorded as pending whose append never completed.
    pub fn load_pending_quanta(&self) -> Result<Vec<Quantum>, LogError> {
        Ok(Self::read_pending_in(&*self.store.read())?
            .map(|model| model.quanta)
            .unwrap_or_default())
    }

    pub fn clear_pending(&self) -> Result<(), LogError> {
        self.store.write().delete(PENDING_KEY)?;
        Ok(())
    }

    // =========================================================================
    // ACCOUNTS AND SETTINGS
    // =========================================================================

    pub fn load_account(&self, public_key: &PublicKey) -> Result<Option<AccountPersistentModel>, LogError> {
        Self::read_account_in(&*self.store.read(), public_key)
    }

    pub fn load_accounts(&self) -> Result<Vec<AccountPersistentModel>, LogError> {
        let store = self.store.read();
        store
            .prefix_scan(KeyPrefix::Account.as_bytes())?
            .into_iter()
            .map(|(key, bytes)| decode_record(&key, &bytes))
            .collect()
    }

    /// Store a settings version effective from `settings.apex`.
    pub fn save_settings(&self, settings: &SettingsPersistentModel) -> Result<(), LogError> {
        self.store
            .write()
            .put(&settings_key(settings.apex), &encode_record(settings)?)?;
        Ok(())
    }

    /// Latest settings version at or below `from_apex`.
    pub fn load_settings(&self, from_apex: u64) -> Result<Option<SettingsPersistentModel>, LogError> {
        let store = self.store.read();
        store
            .scan_back_from(&settings_key(from_apex), KeyPrefix::Settings.as_bytes(), 1)?
            .into_iter()
            .next()
            .map(|(key, bytes)| decode_record(&key, &bytes))
            .transpose()
    }

    // =========================================================================
    // HELPERS (caller holds the lock)
    // =========================================================================

    fn last_apex_in(store: &KV) -> Result<u64, LogError> {
        let hits = store.scan_back_from(&quantum_key(u64::MAX), KeyPrefix::Quantum.as_bytes(), 1)?;
        Ok(hits
            .first()
            .and_then(|(key, _)| KeyPrefix::Quantum.apex_of(key))
            .unwrap_or(0))
    }

    fn tip_in(store: &KV) -> Result<(u64, Hash), LogError> {
        let last = Self::last_apex_in(store)?;
        if last == 0 {
            return Ok((0, ZERO_HASH));
        }
        let model = Self::read_model_in(store, last)?.ok_or(LogError::MissingApex { apex: last })?;
        Ok((last, model.quantum()?.hash()))
    }

    fn pruned_floor_in(store: &KV) -> Result<u64, LogError> {
        match store.get(PRUNED_FLOOR_KEY)? {
            Some(bytes) => decode_record(PRUNED_FLOOR_KEY, &bytes),
            None => Ok(1),
        }
    }

    fn read_model_in(store: &KV, apex: u64) -> Result<Option<QuantumPersistentModel>, LogError> {
        let key = quantum_key(apex);
        store
            .get(&key)?
            .map(|bytes| decode_record(&key, &bytes))
            .transpose()
    }

    fn read_account_in(
        store: &KV,
        public_key: &PublicKey,
    ) -> Result<Option<AccountPersistentModel>, LogError> {
        let key = account_key(public_key);
        store
            .get(&key)?
            .map(|bytes| decode_record(&key, &bytes))
            .transpose()
    }

    fn read_pending_in(store: &KV) -> Result<Option<PendingQuantaPersistentModel>, LogError> {
        store
            .get(PENDING_KEY)?
            .map(|bytes| decode_record(PENDING_KEY, &bytes))
            .transpose()
    }
}
