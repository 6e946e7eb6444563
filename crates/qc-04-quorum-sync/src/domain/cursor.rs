//! # Sync Cursor
//!
//! Per-connection progress. Every explicit reset bumps a generation counter;
//! a batch sent under an older generation cannot advance the cursor, so the
//! next batch is always computed from the reset position.

use shared_types::Cursors;
use std::fmt;

/// Connection sync phase.
///
/// ```text
/// [Uninitialized] ──handshake──→ [Syncing] ──caught up──→ [Live]
///        ↑                                                   │
///        └──────────────── connection lost ──────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Uninitialized,
    /// Bulk catch-up from the peer's cursor.
    Syncing,
    /// Caught up; new quanta are pushed as they are sequenced.
    Live,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Uninitialized => write!(f, "uninitialized"),
            SyncPhase::Syncing => write!(f, "syncing"),
            SyncPhase::Live => write!(f, "live"),
        }
    }
}

/// Cursor pair plus reset generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncCursor {
    cursors: Cursors,
    generation: u64,
}

impl SyncCursor {
    pub fn new(cursors: Cursors) -> Self {
        Self {
            cursors,
            generation: 0,
        }
    }

    pub fn cursors(&self) -> Cursors {
        self.cursors
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Move either cursor, forwards or backwards.
    pub fn reset(&mut self, quantum_cursor: Option<u64>, result_cursor: Option<u64>) {
        if let Some(apex) = quantum_cursor {
            self.cursors.quantum_cursor = apex;
        }
        if let Some(apex) = result_cursor {
            self.cursors.result_cursor = apex;
        }
        self.generation += 1;
    }

    /// Record delivery of quanta up to `apex`. Ignored when a reset happened
    /// since `generation` was read.
    pub fn advance_quanta(&mut self, generation: u64, apex: u64) -> bool {
        if generation != self.generation || apex <= self.cursors.quantum_cursor {
            return false;
        }
        self.cursors.quantum_cursor = apex;
        true
    }

    /// Record delivery of signatures up to `apex`, under the same rule.
    pub fn advance_results(&mut self, generation: u64, apex: u64) -> bool {
        if generation != self.generation
            || self.cursors.is_result_unbounded()
            || apex <= self.cursors.result_cursor
        {
            return false;
        }
        self.cursors.result_cursor = apex;
        true
    }
}
