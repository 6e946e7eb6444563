//! # Logging
//!
//! One `tracing` subscriber per process, filtered by `QC_LOG_LEVEL`
//! (`EnvFilter` syntax, e.g. `info,qc_04_quorum_sync=debug`).

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. A second call, or a subscriber installed
/// elsewhere, is left in place.
pub fn init(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
