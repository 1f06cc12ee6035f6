//! Bounded fan-out to subscribers of the raw event stream and the response
//! stream. Each subscriber gets its own bounded channel; a slow subscriber
//! that falls behind has items dropped rather than backing up the whole
//! broadcast, with a warning logged on the drop.

use tokio::sync::mpsc;
use tracing::warn;

const SUBSCRIBER_QUEUE_CAPACITY: usize = 1000;

struct Subscriber<T> {
    id: String,
    sender: mpsc::Sender<T>,
    source_filters: Vec<String>,
}

/// A registry of fan-out subscribers for one stream kind (events or
/// responses), keyed by an opaque item type `T`.
pub struct SubscriberRegistry<T: Clone + Send + 'static> {
    subscribers: std::sync::Mutex<Vec<Subscriber<T>>>,
}

impl<T: Clone + Send + 'static> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> SubscriberRegistry<T> {
    pub fn new() -> Self {
        Self { subscribers: std::sync::Mutex::new(Vec::new()) }
    }

    /// Register a new subscriber, returning the receiving half of its
    /// channel. An empty `source_filters` list means "subscribe to every
    /// source".
    pub fn add(&self, id: String, source_filters: Vec<String>) -> mpsc::Receiver<T> {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.subscribers.lock().expect("subscriber lock poisoned").push(Subscriber { id, sender, source_filters });
        receiver
    }

    pub fn remove(&self, id: &str) {
        self.subscribers.lock().expect("subscriber lock poisoned").retain(|s| s.id != id);
    }

    /// Broadcast an item to every subscriber whose filters accept `source`.
    /// A full channel drops the item for that subscriber rather than
    /// blocking the broadcast or the caller.
    pub fn broadcast(&self, source: &str, item: T) {
        let subscribers = self.subscribers.lock().expect("subscriber lock poisoned");
        for sub in subscribers.iter() {
            if !sub.source_filters.is_empty() && !sub.source_filters.iter().any(|f| f == source) {
                continue;
            }
            if let Err(mpsc::error::TrySendError::Full(_)) = sub.sender.try_send(item.clone()) {
                warn!(subscriber_id = %sub.id, "subscriber queue full, dropping broadcast item");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("subscriber lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_respects_source_filters() {
        let registry: SubscriberRegistry<String> = SubscriberRegistry::new();
        let mut kitchen_only = registry.add("a".to_string(), vec!["kitchen".to_string()]);
        let mut everything = registry.add("b".to_string(), vec![]);

        registry.broadcast("kitchen", "hello".to_string());
        registry.broadcast("garage", "world".to_string());

        assert_eq!(kitchen_only.recv().await, Some("hello".to_string()));
        assert_eq!(everything.recv().await, Some("hello".to_string()));
        assert_eq!(everything.recv().await, Some("world".to_string()));
    }

    #[tokio::test]
    async fn test_removed_subscriber_stops_receiving() {
        let registry: SubscriberRegistry<String> = SubscriberRegistry::new();
        let _rx = registry.add("a".to_string(), vec![]);
        registry.remove("a");
        assert_eq!(registry.subscriber_count(), 0);
    }
}
