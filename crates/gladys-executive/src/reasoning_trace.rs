//! The reasoning trace is Executive's only piece of state: enough context
//! about a response to re-identify the situation when feedback arrives
//! later, kept only until it ages out or feedback consumes it.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ReasoningTrace {
    pub event_id: String,
    pub response_id: String,
    pub context: String,
    pub response: String,
    pub created_at_ms: i64,
    pub matched_heuristic_id: Option<String>,
    pub predicted_success: f32,
    pub prediction_confidence: f32,
}

impl ReasoningTrace {
    pub fn age_seconds(&self, now_ms: i64) -> i64 {
        (now_ms - self.created_at_ms) / 1000
    }
}

/// In-memory TTL map keyed by `response_id`, guarded by a plain mutex since
/// no hold spans an `.await`.
pub struct TraceStore {
    traces: Mutex<HashMap<String, ReasoningTrace>>,
    sweep_threshold: usize,
}

impl TraceStore {
    pub fn new(sweep_threshold: usize) -> Self {
        Self { traces: Mutex::new(HashMap::new()), sweep_threshold }
    }

    /// Stores a trace under a freshly generated `response_id` and returns it.
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &self,
        event_id: String,
        context: String,
        response: String,
        matched_heuristic_id: Option<String>,
        predicted_success: f32,
        prediction_confidence: f32,
        now_ms: i64,
    ) -> String {
        let response_id = Uuid::new_v4().to_string();
        let trace = ReasoningTrace {
            event_id,
            response_id: response_id.clone(),
            context,
            response,
            created_at_ms: now_ms,
            matched_heuristic_id,
            predicted_success,
            prediction_confidence,
        };

        let mut traces = self.traces.lock().unwrap();
        traces.insert(response_id.clone(), trace);
        if traces.len() > self.sweep_threshold {
            retain_fresh(&mut traces, now_ms, DEFAULT_RETENTION_SEC);
        }
        response_id
    }

    pub fn get(&self, response_id: &str) -> Option<ReasoningTrace> {
        self.traces.lock().unwrap().get(response_id).cloned()
    }

    pub fn remove(&self, response_id: &str) -> Option<ReasoningTrace> {
        self.traces.lock().unwrap().remove(response_id)
    }

    pub fn len(&self) -> usize {
        self.traces.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops traces older than `retention_sec`. Returns how many were dropped.
    pub fn cleanup_expired(&self, now_ms: i64, retention_sec: i64) -> usize {
        let mut traces = self.traces.lock().unwrap();
        let before = traces.len();
        retain_fresh(&mut traces, now_ms, retention_sec);
        before - traces.len()
    }
}

const DEFAULT_RETENTION_SEC: i64 = 300;

fn retain_fresh(traces: &mut HashMap<String, ReasoningTrace>, now_ms: i64, retention_sec: i64) {
    traces.retain(|_, trace| trace.age_seconds(now_ms) <= retention_sec);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_then_get_round_trips() {
        let store = TraceStore::new(100);
        let id = store.store("evt-1".into(), "ctx".into(), "resp".into(), Some("h-1".into()), 0.6, 0.5, 1_000);
        let trace = store.get(&id).unwrap();
        assert_eq!(trace.event_id, "evt-1");
        assert_eq!(trace.matched_heuristic_id.as_deref(), Some("h-1"));
    }

    #[test]
    fn test_remove_consumes_the_trace() {
        let store = TraceStore::new(100);
        let id = store.store("evt-1".into(), "ctx".into(), "resp".into(), None, 0.0, 0.0, 1_000);
        assert!(store.remove(&id).is_some());
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_cleanup_expired_drops_old_traces_only() {
        let store = TraceStore::new(100);
        let old_id = store.store("evt-1".into(), "ctx".into(), "resp".into(), None, 0.0, 0.0, 0);
        let fresh_id = store.store("evt-2".into(), "ctx".into(), "resp".into(), None, 0.0, 0.0, 290_000);
        let dropped = store.cleanup_expired(300_000, 300);
        assert_eq!(dropped, 1);
        assert!(store.get(&old_id).is_none());
        assert!(store.get(&fresh_id).is_some());
    }
}
