//! # Event Publisher
//!
//! `InMemoryEventBus` fans every `LedgerEvent` out to all subscriptions over
//! one `tokio::sync::broadcast` channel. Filtering happens on the receiving
//! side; the bus only keeps count of who listens to which topic.

use crate::events::{EventFilter, EventTopic, LedgerEvent};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Live subscription count per topic. A filter without topics counts under
/// `EventTopic::All`.
pub(crate) type TopicCounts = Arc<RwLock<HashMap<EventTopic, usize>>>;

/// Publishing side of the bus.
///
/// Subsystems hold an `Arc<dyn EventPublisher>`; tests hand them a private
/// bus and subscribe to it.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `event`. Returns how many subscriptions it was delivered to,
    /// before their filters run.
    async fn publish(&self, event: LedgerEvent) -> usize;

    /// Total events published since creation.
    fn events_published(&self) -> u64;
}

pub struct InMemoryEventBus {
    sender: broadcast::Sender<LedgerEvent>,
    topics: TopicCounts,
    events_published: AtomicU64,
    capacity: usize,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// A bus whose subscribers lag after `capacity` unread events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            topics: Arc::new(RwLock::new(HashMap::new())),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to the events `filter` accepts.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let receiver = self.sender.subscribe();
        let keys = topic_keys(&filter);
        if let Ok(mut topics) = self.topics.write() {
            for key in &keys {
                *topics.entry(*key).or_insert(0) += 1;
            }
        }
        debug!(topics = ?keys, "[bus] Subscribed");
        Subscription::new(receiver, filter, self.topics.clone(), keys)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Subscriptions that will see events of `topic`, including catch-all
    /// ones.
    #[must_use]
    pub fn subscribers_for(&self, topic: EventTopic) -> usize {
        let Ok(topics) = self.topics.read() else {
            return 0;
        };
        let specific = if topic == EventTopic::All {
            0
        } else {
            topics.get(&topic).copied().unwrap_or(0)
        };
        specific + topics.get(&EventTopic::All).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Counting keys for one filter.
fn topic_keys(filter: &EventFilter) -> Vec<EventTopic> {
    if filter.topics.is_empty() || filter.topics.contains(&EventTopic::All) {
        return vec![EventTopic::All];
    }
    let mut keys = filter.topics.clone();
    keys.sort_by_key(|topic| *topic as u8);
    keys.dedup();
    keys
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: LedgerEvent) -> usize {
        let topic = event.topic();
        self.events_published.fetch_add(1, Ordering::Relaxed);
        // `send` fails only when nobody is subscribed.
        let receivers = self.sender.send(event).unwrap_or(0);
        trace!(?topic, receivers, "[bus] Published");
        receivers
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
