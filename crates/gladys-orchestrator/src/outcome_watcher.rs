//! Tracks heuristic fires whose outcome can be confirmed by a later event,
//! rather than by explicit feedback or an undo.
//!
//! Registering a fire looks up a configured `trigger_pattern` against the
//! heuristic's condition text; if one matches, the fire is tracked with the
//! paired `outcome_pattern` to watch for. A later event whose text contains
//! that pattern confirms the expectation; one that never arrives within the
//! configured timeout is flushed as an implicit positive (the thing the
//! heuristic predicted kept not going wrong, which reads as success).

use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct OutcomePattern {
    pub trigger_pattern: String,
    pub outcome_pattern: String,
}

/// Parse `outcome_patterns_json`. An empty list with a logged warning is
/// used when the JSON is malformed, matching the configuration section's
/// graceful-degradation contract rather than failing startup.
pub fn parse_patterns(json: &str) -> Vec<OutcomePattern> {
    match serde_json::from_str::<Vec<OutcomePattern>>(json) {
        Ok(patterns) => patterns,
        Err(e) => {
            warn!(error = %e, "failed to parse outcome_patterns_json, watching no patterns");
            Vec::new()
        }
    }
}

#[derive(Debug, Clone)]
struct OutcomeExpectation {
    heuristic_id: Uuid,
    event_id: String,
    predicted_success: f32,
    outcome_pattern: String,
    registered_at_ms: i64,
}

pub struct OutcomeWatcher {
    patterns: Vec<OutcomePattern>,
    timeout_ms: i64,
    pending: std::sync::Mutex<Vec<OutcomeExpectation>>,
}

impl OutcomeWatcher {
    pub fn new(patterns: Vec<OutcomePattern>, timeout_sec: i64) -> Self {
        Self { patterns, timeout_ms: timeout_sec * 1000, pending: std::sync::Mutex::new(Vec::new()) }
    }

    /// Register a fire for outcome tracking if a configured pattern's
    /// `trigger_pattern` appears in the heuristic's condition text. Fires
    /// with no matching pattern are not tracked; nothing will ever confirm
    /// or time them out through this path.
    pub fn register_fire(
        &self,
        heuristic_id: Uuid,
        event_id: &str,
        predicted_success: f32,
        condition_text: &str,
        now_ms: i64,
    ) {
        let condition_lower = condition_text.to_lowercase();
        let Some(pattern) = self.patterns.iter().find(|p| condition_lower.contains(&p.trigger_pattern.to_lowercase())) else {
            return;
        };
        self.pending.lock().expect("outcome watcher lock poisoned").push(OutcomeExpectation {
            heuristic_id,
            event_id: event_id.to_string(),
            predicted_success,
            outcome_pattern: pattern.outcome_pattern.clone(),
            registered_at_ms: now_ms,
        });
    }

    /// Check a newly-ingested event's text against pending expectations.
    /// Matches are removed and their heuristic ids returned as confirmed.
    pub fn check_event(&self, event_text: &str) -> Vec<Uuid> {
        let text_lower = event_text.to_lowercase();
        let mut pending = self.pending.lock().expect("outcome watcher lock poisoned");
        let mut confirmed = Vec::new();
        pending.retain(|expectation| {
            if text_lower.contains(&expectation.outcome_pattern.to_lowercase()) {
                confirmed.push(expectation.heuristic_id);
                false
            } else {
                true
            }
        });
        confirmed
    }

    /// Expectations that have sat past the timeout, without removing them.
    pub fn get_expired_items(&self, now_ms: i64) -> Vec<(Uuid, String)> {
        self.pending
            .lock()
            .expect("outcome watcher lock poisoned")
            .iter()
            .filter(|e| now_ms - e.registered_at_ms >= self.timeout_ms)
            .map(|e| (e.heuristic_id, e.event_id.clone()))
            .collect()
    }

    /// Remove expired expectations, returning how many were purged.
    pub fn cleanup_expired(&self, now_ms: i64) -> usize {
        let mut pending = self.pending.lock().expect("outcome watcher lock poisoned");
        let before = pending.len();
        pending.retain(|e| now_ms - e.registered_at_ms < self.timeout_ms);
        before - pending.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("outcome watcher lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watcher() -> OutcomeWatcher {
        let patterns = vec![OutcomePattern {
            trigger_pattern: "oven".to_string(),
            outcome_pattern: "oven is off".to_string(),
        }];
        OutcomeWatcher::new(patterns, 120)
    }

    #[test]
    fn test_parse_patterns_recovers_from_malformed_json() {
        assert!(parse_patterns("not json").is_empty());
        assert!(parse_patterns("[]").is_empty());
    }

    #[test]
    fn test_register_fire_requires_pattern_match() {
        let w = watcher();
        w.register_fire(Uuid::new_v4(), "e1", 0.8, "the kettle is boiling", 0);
        assert_eq!(w.pending_count(), 0);

        w.register_fire(Uuid::new_v4(), "e2", 0.8, "the oven timer has expired", 0);
        assert_eq!(w.pending_count(), 1);
    }

    #[test]
    fn test_check_event_confirms_and_removes() {
        let w = watcher();
        let hid = Uuid::new_v4();
        w.register_fire(hid, "e1", 0.8, "the oven timer has expired", 0);

        let confirmed = w.check_event("I checked and the oven is off now");
        assert_eq!(confirmed, vec![hid]);
        assert_eq!(w.pending_count(), 0);
    }

    #[test]
    fn test_expired_items_flushed_after_timeout() {
        let w = watcher();
        let hid = Uuid::new_v4();
        w.register_fire(hid, "e1", 0.8, "the oven timer has expired", 0);

        assert!(w.get_expired_items(60_000).is_empty());
        let expired = w.get_expired_items(120_000);
        assert_eq!(expired, vec![(hid, "e1".to_string())]);

        assert_eq!(w.cleanup_expired(120_000), 1);
        assert_eq!(w.pending_count(), 0);
    }
}
