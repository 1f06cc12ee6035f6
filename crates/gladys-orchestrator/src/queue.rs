//! The salience-priority event queue.
//!
//! Every non-emergency event is enqueued here with its salience as priority.
//! A single worker task drains the queue highest-salience-first, FIFO on
//! ties; a separate timeout scanner removes items that sit too long and
//! reports them back as expired instead of processed.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Mutex;

use gladys_proto::orchestrator::{Event, QueuedEventInfo};
use tokio::sync::Notify;

/// An event waiting for the worker, plus the bookkeeping the worker and the
/// timeout scanner both need.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub event_id: String,
    pub event: Event,
    pub salience_priority: f32,
    pub enqueued_at_ms: i64,
    pub matched_heuristic_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStatsSnapshot {
    pub queue_size: u64,
    pub total_queued: u64,
    pub total_processed: u64,
    pub total_timed_out: u64,
}

/// Heap key: highest salience first, earlier-enqueued first on ties. Only
/// the fields needed to order and to find the full `QueuedEvent` are kept
/// here; the heap is a pure priority index over `pending`.
#[derive(Debug, Clone)]
struct HeapEntry {
    salience_priority: f32,
    counter: u64,
    event_id: String,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.salience_priority == other.salience_priority && self.counter == other.counter
    }
}
impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.salience_priority
            .total_cmp(&other.salience_priority)
            .then_with(|| other.counter.cmp(&self.counter))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    heap: BinaryHeap<HeapEntry>,
    pending: HashMap<String, QueuedEvent>,
    counter: u64,
    stats: QueueStatsSnapshot,
}

/// A max-heap-by-salience queue with O(1) removal-by-id, guarded by a plain
/// `std::sync::Mutex` since every critical section here is non-blocking pure
/// bookkeeping; async waiting happens only on the `Notify`, outside the lock.
pub struct EventQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                pending: HashMap::new(),
                counter: 0,
                stats: QueueStatsSnapshot::default(),
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue an event, returning the id it was assigned.
    pub fn enqueue(
        &self,
        event: Event,
        salience_priority: f32,
        enqueued_at_ms: i64,
        matched_heuristic_id: Option<String>,
    ) -> String {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let event_id = event.id.clone();
        let counter = inner.counter;
        inner.counter += 1;
        inner.heap.push(HeapEntry { salience_priority, counter, event_id: event_id.clone() });
        inner.pending.insert(
            event_id.clone(),
            QueuedEvent { event_id: event_id.clone(), event, salience_priority, enqueued_at_ms, matched_heuristic_id },
        );
        inner.stats.queue_size = inner.pending.len() as u64;
        inner.stats.total_queued += 1;
        drop(inner);
        self.notify.notify_one();
        event_id
    }

    /// Pop the highest-priority still-pending event, waiting if the queue is
    /// empty. Heap entries whose `event_id` was already removed (e.g. by the
    /// timeout scanner) are skipped rather than returned.
    pub async fn dequeue(&self) -> QueuedEvent {
        loop {
            {
                let mut inner = self.inner.lock().expect("queue lock poisoned");
                while let Some(top) = inner.heap.pop() {
                    if let Some(queued) = inner.pending.remove(&top.event_id) {
                        inner.stats.queue_size = inner.pending.len() as u64;
                        inner.stats.total_processed += 1;
                        return queued;
                    }
                }
            }
            self.notify.notified().await;
        }
    }

    /// Remove an event from the queue without processing it, used by the
    /// timeout scanner. Returns it if it was still pending.
    pub fn remove(&self, event_id: &str) -> Option<QueuedEvent> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let removed = inner.pending.remove(event_id);
        if removed.is_some() {
            inner.stats.queue_size = inner.pending.len() as u64;
        }
        removed
    }

    /// All pending events older than `timeout_ms` as of `now_ms`, removed
    /// from the queue as a side effect (the timeout scanner's sweep).
    pub fn expire_older_than(&self, now_ms: i64, timeout_ms: i64) -> Vec<QueuedEvent> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let expired_ids: Vec<String> = inner
            .pending
            .values()
            .filter(|q| now_ms - q.enqueued_at_ms >= timeout_ms)
            .map(|q| q.event_id.clone())
            .collect();
        let mut expired = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            if let Some(q) = inner.pending.remove(&id) {
                expired.push(q);
            }
        }
        if !expired.is_empty() {
            inner.stats.queue_size = inner.pending.len() as u64;
            inner.stats.total_timed_out += expired.len() as u64;
        }
        expired
    }

    pub fn queue_size(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").pending.len()
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.inner.lock().expect("queue lock poisoned").stats
    }

    /// Pending events sorted by priority, highest first, without removing
    /// them (for `ListQueuedEvents`).
    pub fn list(&self, limit: usize) -> Vec<QueuedEventInfo> {
        let inner = self.inner.lock().expect("queue lock poisoned");
        let mut items: Vec<&QueuedEvent> = inner.pending.values().collect();
        items.sort_by(|a, b| b.salience_priority.total_cmp(&a.salience_priority));
        items
            .into_iter()
            .take(limit)
            .map(|q| QueuedEventInfo {
                event_id: q.event_id.clone(),
                source: q.event.source.clone(),
                salience_priority: q.salience_priority,
                enqueued_at_ms: q.enqueued_at_ms,
                matched_heuristic_id: q.matched_heuristic_id.clone().unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, source: &str) -> Event {
        Event {
            id: id.to_string(),
            source: source.to_string(),
            raw_text: "test event".to_string(),
            timestamp_ms: 0,
            salience_override: None,
            has_salience_override: false,
        }
    }

    #[tokio::test]
    async fn test_dequeue_orders_by_salience_then_fifo() {
        let queue = EventQueue::new();
        queue.enqueue(event("a", "s"), 0.2, 0, None);
        queue.enqueue(event("b", "s"), 0.9, 1, None);
        queue.enqueue(event("c", "s"), 0.5, 2, None);

        assert_eq!(queue.dequeue().await.event_id, "b");
        assert_eq!(queue.dequeue().await.event_id, "c");
        assert_eq!(queue.dequeue().await.event_id, "a");
    }

    #[tokio::test]
    async fn test_dequeue_fifo_on_equal_salience() {
        let queue = EventQueue::new();
        queue.enqueue(event("first", "s"), 0.5, 0, None);
        queue.enqueue(event("second", "s"), 0.5, 1, None);

        assert_eq!(queue.dequeue().await.event_id, "first");
        assert_eq!(queue.dequeue().await.event_id, "second");
    }

    #[test]
    fn test_remove_excludes_from_future_dequeue() {
        let queue = EventQueue::new();
        queue.enqueue(event("a", "s"), 0.5, 0, None);
        assert!(queue.remove("a").is_some());
        assert_eq!(queue.queue_size(), 0);
        assert!(queue.remove("a").is_none());
    }

    #[test]
    fn test_expire_older_than_removes_stale_entries() {
        let queue = EventQueue::new();
        queue.enqueue(event("old", "s"), 0.5, 0, None);
        queue.enqueue(event("new", "s"), 0.5, 1000, None);

        let expired = queue.expire_older_than(31_000, 30_000);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].event_id, "old");
        assert_eq!(queue.queue_size(), 1);
    }

    #[tokio::test]
    async fn test_dequeue_skips_entries_already_removed() {
        let queue = EventQueue::new();
        queue.enqueue(event("a", "s"), 0.9, 0, None);
        queue.enqueue(event("b", "s"), 0.5, 1, None);
        queue.remove("a");
        assert_eq!(queue.dequeue().await.event_id, "b");
    }
}
