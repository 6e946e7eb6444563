//! # Apex-Chain Node
//!
//! Runs one node in the role given by `QC_ROLE`.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from `QC_*` variables
//! 2. Initialise logging
//! 3. Lock the data directory, open and recover the Apex Log
//! 4. Start the Prime or Auditor runtime
//! 5. Report status until Ctrl-C, then shut down cleanly
//!
//! Peer and client transports attach through `PrimeNode::connect_auditor`,
//! `PrimeNode::connect_client` and `AuditorNode::connect_prime`.

use anyhow::{Context, Result};
use node_runtime::container::{NodeConfig, NodeContainer, NodeStatus};
use node_runtime::handlers::{AuditorNode, PrimeNode};
use node_runtime::logging;
use shared_types::NodeRole;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

enum Runtime {
    Prime(Arc<PrimeNode>),
    Auditor(Arc<AuditorNode>),
}

impl Runtime {
    fn status(&self) -> NodeStatus {
        match self {
            Runtime::Prime(prime) => prime.status(),
            Runtime::Auditor(auditor) => auditor.status(),
        }
    }

    async fn shutdown(&self) {
        match self {
            Runtime::Prime(prime) => prime.shutdown().await,
            Runtime::Auditor(auditor) => auditor.shutdown().await,
        }
    }
}

fn report(status: &NodeStatus) {
    match serde_json::to_string(status) {
        Ok(json) => info!("[runtime] Status {}", json),
        Err(e) => error!("[runtime] Could not encode status: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env().context("Invalid QC_* configuration")?;
    logging::init(&config.log_level);
    info!(
        version = node_runtime::VERSION,
        role = %config.role,
        "[runtime] Apex-chain node starting"
    );

    let role = config.role;
    let node = Arc::new(
        NodeContainer::open(config)
            .await
            .context("Node failed to start")?,
    );
    let runtime = match role {
        NodeRole::Prime => Runtime::Prime(PrimeNode::start(node.clone())?),
        NodeRole::Auditor => Runtime::Auditor(AuditorNode::start(node.clone())?),
    };
    report(&runtime.status());

    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("[runtime] Signal handler failed: {}", e);
                }
                break;
            }
            _ = ticker.tick() => {
                let status = runtime.status();
                report(&status);
                if node.is_failed() {
                    error!("[runtime] Node has failed, operator intervention required");
                }
            }
        }
    }

    info!("[runtime] Shutting down");
    runtime.shutdown().await;
    report(&runtime.status());
    Ok(())
}
