//! The `PersistentStore` trait: durable storage for events, heuristics, and
//! fires, plus the in-memory double used by tests and the matching cache's
//! unit tests.

use async_trait::async_trait;
use gladys_common::cosine_similarity;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{EpisodicEvent, FireOutcome, Heuristic, HeuristicFire, HeuristicMatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage for episodic events, heuristics, and heuristic fires.
///
/// Entity/relationship storage for semantic-memory queries is intentionally
/// not part of this trait's required surface: it is outside the closed
/// learning loop's hot path, and a second adapter can add it later without
/// touching callers of this trait.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn store_event(&self, event: &EpisodicEvent) -> StoreResult<()>;
    async fn query_by_time(
        &self,
        start_ms: i64,
        end_ms: i64,
        source_filter: Option<&str>,
        limit: i32,
    ) -> StoreResult<Vec<EpisodicEvent>>;
    async fn query_by_similarity(
        &self,
        query_embedding: &[f32],
        similarity_threshold: f32,
        time_filter_hours: Option<i64>,
        limit: i32,
    ) -> StoreResult<Vec<EpisodicEvent>>;

    async fn store_heuristic(&self, heuristic: &Heuristic) -> StoreResult<()>;
    async fn get_heuristic(&self, id: Uuid) -> StoreResult<Heuristic>;
    async fn query_heuristics(&self, min_confidence: f32, limit: i32) -> StoreResult<Vec<HeuristicMatch>>;
    async fn query_matching_heuristics(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        min_confidence: f32,
        min_similarity: f32,
        limit: i32,
        source_filter: Option<&str>,
    ) -> StoreResult<Vec<HeuristicMatch>>;
    /// Set confidence/fire_count/success_count atomically and return the previous values.
    async fn update_heuristic_counters(
        &self,
        id: Uuid,
        fire_count: i64,
        success_count: i64,
        confidence: f32,
    ) -> StoreResult<()>;

    async fn record_heuristic_fire(
        &self,
        heuristic_id: Uuid,
        event_id: &str,
        episodic_event_id: Option<&str>,
    ) -> StoreResult<Uuid>;
    async fn update_fire_outcome(
        &self,
        fire_id: Uuid,
        outcome: FireOutcome,
        feedback_source: &str,
    ) -> StoreResult<()>;
    /// The most recent `unknown` fire for a heuristic, used to resolve feedback.
    async fn latest_unknown_fire(&self, heuristic_id: Uuid) -> StoreResult<Option<HeuristicFire>>;
    async fn get_pending_fires(&self, heuristic_id: Option<Uuid>, max_age_ms: i64) -> StoreResult<Vec<HeuristicFire>>;
}

/// In-memory `PersistentStore` double. Used by unit tests and as a
/// cache-only fallback when no database is configured.
#[derive(Default)]
pub struct InMemoryStore {
    events: Mutex<Vec<EpisodicEvent>>,
    heuristics: Mutex<HashMap<Uuid, Heuristic>>,
    fires: Mutex<Vec<HeuristicFire>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_source_prefix(condition_text: &str, source_filter: Option<&str>) -> bool {
    match source_filter {
        None => true,
        Some(prefix) => condition_text.starts_with(&format!("{prefix}:")),
    }
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn store_event(&self, event: &EpisodicEvent) -> StoreResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn query_by_time(
        &self,
        start_ms: i64,
        end_ms: i64,
        source_filter: Option<&str>,
        limit: i32,
    ) -> StoreResult<Vec<EpisodicEvent>> {
        let events = self.events.lock().unwrap();
        let mut matches: Vec<EpisodicEvent> = events
            .iter()
            .filter(|e| e.timestamp_ms >= start_ms && e.timestamp_ms <= end_ms)
            .filter(|e| source_filter.map(|s| e.source == s).unwrap_or(true))
            .cloned()
            .collect();
        matches.sort_by_key(|e| std::cmp::Reverse(e.timestamp_ms));
        let limit = if limit > 0 { limit as usize } else { 100 };
        matches.truncate(limit);
        Ok(matches)
    }

    async fn query_by_similarity(
        &self,
        query_embedding: &[f32],
        similarity_threshold: f32,
        time_filter_hours: Option<i64>,
        limit: i32,
    ) -> StoreResult<Vec<EpisodicEvent>> {
        let events = self.events.lock().unwrap();
        let cutoff_ms = time_filter_hours.map(|h| gladys_common::now_ms() - h * 3_600_000);
        let mut matches: Vec<(f32, EpisodicEvent)> = events
            .iter()
            .filter(|e| cutoff_ms.map(|c| e.timestamp_ms >= c).unwrap_or(true))
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e.clone()))
            .filter(|(sim, _)| *sim >= similarity_threshold)
            .collect();
        matches.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let limit = if limit > 0 { limit as usize } else { 10 };
        matches.truncate(limit);
        Ok(matches.into_iter().map(|(_, e)| e).collect())
    }

    async fn store_heuristic(&self, heuristic: &Heuristic) -> StoreResult<()> {
        self.heuristics.lock().unwrap().insert(heuristic.id, heuristic.clone());
        Ok(())
    }

    async fn get_heuristic(&self, id: Uuid) -> StoreResult<Heuristic> {
        self.heuristics
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn query_heuristics(&self, min_confidence: f32, limit: i32) -> StoreResult<Vec<HeuristicMatch>> {
        let heuristics = self.heuristics.lock().unwrap();
        let mut matches: Vec<HeuristicMatch> = heuristics
            .values()
            .filter(|h| !h.frozen && h.confidence >= min_confidence)
            .map(|h| HeuristicMatch { heuristic: h.clone(), similarity: 1.0, score: h.confidence })
            .collect();
        matches.sort_by(|a, b| b.heuristic.confidence.partial_cmp(&a.heuristic.confidence).unwrap());
        let limit = if limit > 0 { limit as usize } else { 100 };
        matches.truncate(limit);
        Ok(matches)
    }

    async fn query_matching_heuristics(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        min_confidence: f32,
        min_similarity: f32,
        limit: i32,
        source_filter: Option<&str>,
    ) -> StoreResult<Vec<HeuristicMatch>> {
        let heuristics = self.heuristics.lock().unwrap();
        let candidates: Vec<&Heuristic> = heuristics
            .values()
            .filter(|h| !h.frozen && h.confidence >= min_confidence)
            .filter(|h| matches_source_prefix(&h.condition_text, source_filter))
            .collect();

        let mut embedding_matches: Vec<(f32, &Heuristic)> = candidates
            .iter()
            .filter(|h| !h.condition_embedding.is_empty() && !query_embedding.is_empty())
            .map(|h| (cosine_similarity(query_embedding, &h.condition_embedding), *h))
            .filter(|(sim, _)| *sim >= min_similarity)
            .collect();
        embedding_matches.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let results: Vec<HeuristicMatch> = if !embedding_matches.is_empty() {
            embedding_matches
                .into_iter()
                .map(|(sim, h)| HeuristicMatch { heuristic: h.clone(), similarity: sim, score: sim * h.confidence })
                .collect()
        } else {
            // Transitional full-text fallback for heuristics without embeddings.
            let query_lower = query_text.to_lowercase();
            let query_words: std::collections::HashSet<&str> = query_lower.split_whitespace().collect();
            candidates
                .into_iter()
                .filter(|h| {
                    let condition_lower = h.condition_text.to_lowercase();
                    query_words.iter().any(|w| condition_lower.contains(w))
                })
                .map(|h| HeuristicMatch { heuristic: h.clone(), similarity: 0.0, score: h.confidence })
                .collect()
        };

        let limit = if limit > 0 { limit as usize } else { 10 };
        Ok(results.into_iter().take(limit).collect())
    }

    async fn update_heuristic_counters(
        &self,
        id: Uuid,
        fire_count: i64,
        success_count: i64,
        confidence: f32,
    ) -> StoreResult<()> {
        let mut heuristics = self.heuristics.lock().unwrap();
        let h = heuristics.get_mut(&id).ok_or(StoreError::NotFound)?;
        h.fire_count = fire_count;
        h.success_count = success_count;
        h.confidence = confidence;
        h.updated_at_ms = gladys_common::now_ms();
        Ok(())
    }

    async fn record_heuristic_fire(
        &self,
        heuristic_id: Uuid,
        event_id: &str,
        episodic_event_id: Option<&str>,
    ) -> StoreResult<Uuid> {
        let fire = HeuristicFire {
            id: Uuid::new_v4(),
            heuristic_id,
            event_id: event_id.to_string(),
            fired_at_ms: gladys_common::now_ms(),
            outcome: FireOutcome::Unknown,
            feedback_source: String::new(),
            episodic_event_id: episodic_event_id.map(|s| s.to_string()),
        };
        let id = fire.id;
        self.fires.lock().unwrap().push(fire);
        Ok(id)
    }

    async fn update_fire_outcome(&self, fire_id: Uuid, outcome: FireOutcome, feedback_source: &str) -> StoreResult<()> {
        let mut fires = self.fires.lock().unwrap();
        let fire = fires.iter_mut().find(|f| f.id == fire_id).ok_or(StoreError::NotFound)?;
        if fire.outcome != FireOutcome::Unknown {
            return Ok(()); // already terminal: second transition is a no-op
        }
        fire.outcome = outcome;
        fire.feedback_source = feedback_source.to_string();
        Ok(())
    }

    async fn latest_unknown_fire(&self, heuristic_id: Uuid) -> StoreResult<Option<HeuristicFire>> {
        let fires = self.fires.lock().unwrap();
        let latest = fires
            .iter()
            .filter(|f| f.heuristic_id == heuristic_id && f.outcome == FireOutcome::Unknown)
            .max_by_key(|f| f.fired_at_ms)
            .cloned();
        Ok(latest)
    }

    async fn get_pending_fires(&self, heuristic_id: Option<Uuid>, max_age_ms: i64) -> StoreResult<Vec<HeuristicFire>> {
        let now = gladys_common::now_ms();
        let fires = self.fires.lock().unwrap();
        Ok(fires
            .iter()
            .filter(|f| f.outcome == FireOutcome::Unknown)
            .filter(|f| heuristic_id.map(|id| f.heuristic_id == id).unwrap_or(true))
            .filter(|f| now - f.fired_at_ms <= max_age_ms)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Effects;

    fn sample_heuristic(condition_text: &str, confidence: f32) -> Heuristic {
        Heuristic {
            id: Uuid::new_v4(),
            name: "test".into(),
            condition_text: condition_text.into(),
            condition_embedding: vec![1.0, 0.0, 0.0],
            effects: Effects { action_type: "suggest".into(), message: "turn off the oven right away please".into() },
            confidence,
            origin: "learned".into(),
            origin_id: String::new(),
            fire_count: 0,
            success_count: 0,
            created_at_ms: 0,
            updated_at_ms: 0,
            frozen: false,
        }
    }

    #[tokio::test]
    async fn test_store_and_get_heuristic() {
        let store = InMemoryStore::new();
        let h = sample_heuristic("the oven timer has expired", 0.5);
        store.store_heuristic(&h).await.unwrap();
        let fetched = store.get_heuristic(h.id).await.unwrap();
        assert_eq!(fetched.id, h.id);
        assert_eq!(fetched.condition_text, h.condition_text);
    }

    #[tokio::test]
    async fn test_get_heuristic_not_found() {
        let store = InMemoryStore::new();
        let err = store.get_heuristic(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_query_matching_heuristics_embedding_path() {
        let store = InMemoryStore::new();
        let h = sample_heuristic("the oven timer has expired", 0.5);
        store.store_heuristic(&h).await.unwrap();

        let results = store
            .query_matching_heuristics(&[1.0, 0.0, 0.0], "oven timer", 0.0, 0.7, 10, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].similarity > 0.99);
    }

    #[tokio::test]
    async fn test_query_matching_heuristics_text_fallback() {
        let store = InMemoryStore::new();
        let mut h = sample_heuristic("the oven timer has expired", 0.5);
        h.condition_embedding = vec![]; // no embedding -> text fallback
        store.store_heuristic(&h).await.unwrap();

        let results = store
            .query_matching_heuristics(&[], "the oven buzzer rang", 0.0, 0.7, 10, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_query_matching_heuristics_source_filter() {
        let store = InMemoryStore::new();
        let h = sample_heuristic("kitchen:the oven timer has expired", 0.5);
        store.store_heuristic(&h).await.unwrap();

        let results = store
            .query_matching_heuristics(&[1.0, 0.0, 0.0], "", 0.0, 0.7, 10, Some("kitchen"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        let none = store
            .query_matching_heuristics(&[1.0, 0.0, 0.0], "", 0.0, 0.7, 10, Some("lights"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_fire_lifecycle() {
        let store = InMemoryStore::new();
        let h = sample_heuristic("the oven timer has expired", 0.5);
        store.store_heuristic(&h).await.unwrap();

        let fire_id = store.record_heuristic_fire(h.id, "event-1", None).await.unwrap();
        let pending = store.get_pending_fires(Some(h.id), 60_000).await.unwrap();
        assert_eq!(pending.len(), 1);

        store.update_fire_outcome(fire_id, FireOutcome::Success, "explicit").await.unwrap();
        let pending_after = store.get_pending_fires(Some(h.id), 60_000).await.unwrap();
        assert!(pending_after.is_empty());

        // Updating the same fire again is a no-op on an already-terminal fire.
        store.update_fire_outcome(fire_id, FireOutcome::Fail, "explicit").await.unwrap();
        let latest = store.latest_unknown_fire(h.id).await.unwrap();
        assert!(latest.is_none());
    }
}
