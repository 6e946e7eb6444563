//! # Event Routing
//!
//! Delivers bus events to the role runtimes:
//!
//! ```text
//! QUANTUM HANDLER (2)                 ROLE MANAGER (3)
//!     │                                   │
//!     ├──QuantumSequenced──┐              ├──NodeStateChanged──┐
//!     ├──QuantumFinalized──┤              └──AuditorStateChanged┤
//!     │                    ▼                                   ▼
//!     │             ┌─────────────┐                     ┌─────────────┐
//!     └────────────►│ Event Bus   │────── router ──────►│ Sink        │
//!                   └─────────────┘                     │ (Prime or   │
//!                                                       │  Auditor)   │
//!                                                       └─────────────┘
//! ```
//!
//! Each router owns one subscription and ends when the shutdown signal
//! fires or the bus is dropped. A router that falls behind the bus tells
//! its sink how many events it lost; the sink rebuilds what it needs from
//! the Apex Log.

use async_trait::async_trait;
use shared_bus::{Delivery, EventFilter, InMemoryEventBus, LedgerEvent};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Consumer of routed events.
#[async_trait]
pub trait LedgerEventSink: Send + Sync + 'static {
    async fn on_event(&self, event: LedgerEvent);

    /// `skipped` events were lost before they could be routed.
    async fn on_lagged(&self, _skipped: u64) {}
}

/// Subscribe to `filter` and forward every event to `sink` until shutdown.
///
/// The subscription exists when this returns, so no event published
/// afterwards is missed.
pub fn spawn_router(
    bus: &InMemoryEventBus,
    filter: EventFilter,
    sink: Arc<dyn LedgerEventSink>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut subscription = bus.subscribe(filter);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("[runtime] Event router stopping");
                    break;
                }
                delivery = subscription.recv_delivery() => match delivery {
                    Some(Delivery::Event(event)) => sink.on_event(event).await,
                    Some(Delivery::Lagged { skipped }) => sink.on_lagged(skipped).await,
                    None => break,
                },
            }
        }
    })
}
