//! # Event Subscriber
//!
//! A `Subscription` is a broadcast receiver plus the filter it applies.
//! A subscriber that falls more than the bus capacity behind skips the
//! oldest events and keeps going. Consumers that must not miss an apex
//! read through `recv_delivery`, learn how many events they lost and
//! re-read the Apex Log for them.

use crate::events::{EventFilter, EventTopic, LedgerEvent};
use crate::publisher::TopicCounts;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Event bus closed")]
    Closed,
}

/// One step of a subscription.
#[derive(Debug, Clone)]
pub enum Delivery {
    Event(LedgerEvent),
    /// `skipped` events were overwritten before this subscriber read them.
    Lagged { skipped: u64 },
}

/// Receiving handle. Dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<LedgerEvent>,
    filter: EventFilter,
    topics: TopicCounts,
    keys: Vec<EventTopic>,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<LedgerEvent>,
        filter: EventFilter,
        topics: TopicCounts,
        keys: Vec<EventTopic>,
    ) -> Self {
        Self {
            receiver,
            filter,
            topics,
            keys,
        }
    }

    /// Next event accepted by the filter, or `None` once the bus is gone.
    /// Lost events are logged and skipped.
    pub async fn recv(&mut self) -> Option<LedgerEvent> {
        loop {
            match self.recv_delivery().await? {
                Delivery::Event(event) => return Some(event),
                Delivery::Lagged { .. } => {}
            }
        }
    }

    /// Next event accepted by the filter, or the number of events lost
    /// since the previous call. `None` once the bus is gone.
    pub async fn recv_delivery(&mut self) -> Option<Delivery> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(Delivery::Event(event)),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, topics = ?self.keys, "[bus] Subscriber lagged");
                    return Some(Delivery::Lagged { skipped });
                }
            }
        }
    }

    /// Next queued event accepted by the filter, without waiting.
    /// `Ok(None)` when nothing matching is queued.
    pub fn try_recv(&mut self) -> Result<Option<LedgerEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, topics = ?self.keys, "[bus] Subscriber lagged");
                }
            }
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Ok(mut topics) = self.topics.write() else {
            return;
        };
        for key in &self.keys {
            if let Some(count) = topics.get_mut(key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    topics.remove(key);
                }
            }
        }
    }
}
