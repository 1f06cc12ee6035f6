//! Warm-read matching cache for heuristics, fronting the persistent store.
//!
//! Keeps confident, frequently-used heuristics in memory so that
//! `queryMatchingHeuristics` does not round-trip to Postgres on every event.
//! Eviction is LRU by access recency, bounded by `CacheConfig::max_heuristics`.

use std::num::NonZeroUsize;

use lru::LruCache;
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::domain::Heuristic;
use gladys_common::cosine_similarity;

pub struct HeuristicCache {
    entries: LruCache<Uuid, Heuristic>,
    total_hits: u64,
    total_misses: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub heuristic_count: usize,
    pub max_heuristics: usize,
    pub total_hits: u64,
    pub total_misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f32 {
        let total = self.total_hits + self.total_misses;
        if total == 0 {
            0.0
        } else {
            self.total_hits as f32 / total as f32
        }
    }
}

impl HeuristicCache {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_heuristics.max(1)).expect("nonzero");
        Self {
            entries: LruCache::new(capacity),
            total_hits: 0,
            total_misses: 0,
        }
    }

    pub fn put(&mut self, heuristic: Heuristic) {
        self.entries.put(heuristic.id, heuristic);
    }

    pub fn get(&mut self, id: &Uuid) -> Option<&Heuristic> {
        let found = self.entries.get(id);
        if found.is_some() {
            self.total_hits += 1;
        } else {
            self.total_misses += 1;
        }
        found
    }

    /// Look up without affecting hit/miss statistics or LRU recency.
    pub fn peek(&self, id: &Uuid) -> Option<&Heuristic> {
        self.entries.peek(id)
    }

    pub fn remove(&mut self, id: &Uuid) -> bool {
        self.entries.pop(id).is_some()
    }

    pub fn flush(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn list(&self, limit: usize) -> Vec<&Heuristic> {
        let all: Vec<&Heuristic> = self.entries.iter().map(|(_, h)| h).collect();
        if limit > 0 && all.len() > limit {
            all.into_iter().take(limit).collect()
        } else {
            all
        }
    }

    /// Cosine-similarity match against cached, non-frozen heuristics only.
    /// A cache miss (empty result) tells the caller to fall back to the store.
    pub fn find_matching(
        &self,
        query_embedding: &[f32],
        min_similarity: f32,
        min_confidence: f32,
        limit: usize,
    ) -> Vec<(Uuid, f32)> {
        if query_embedding.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<(Uuid, f32)> = self
            .entries
            .iter()
            .filter(|(_, h)| !h.frozen && h.confidence >= min_confidence && !h.condition_embedding.is_empty())
            .filter_map(|(id, h)| {
                let sim = cosine_similarity(query_embedding, &h.condition_embedding);
                (sim >= min_similarity).then_some((*id, sim))
            })
            .collect();

        matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        if limit > 0 && matches.len() > limit {
            matches.truncate(limit);
        }
        matches
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            heuristic_count: self.entries.len(),
            max_heuristics: self.entries.cap().get(),
            total_hits: self.total_hits,
            total_misses: self.total_misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Effects;

    fn sample(id: Uuid, confidence: f32, embedding: Vec<f32>) -> Heuristic {
        Heuristic {
            id,
            name: "test".into(),
            condition_text: "the oven timer has expired".into(),
            condition_embedding: embedding,
            effects: Effects { action_type: "suggest".into(), message: "turn off the oven".into() },
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

    #[test]
    fn test_put_and_get_tracks_hits_and_misses() {
        let mut cache = HeuristicCache::new(&CacheConfig { max_heuristics: 10 });
        let id = Uuid::new_v4();
        cache.put(sample(id, 0.8, vec![1.0; 4]));

        assert!(cache.get(&id).is_some());
        assert!(cache.get(&Uuid::new_v4()).is_none());

        let stats = cache.stats();
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.total_misses, 1);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let mut cache = HeuristicCache::new(&CacheConfig { max_heuristics: 2 });
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        cache.put(sample(a, 0.5, vec![1.0; 4]));
        cache.put(sample(b, 0.5, vec![1.0; 4]));
        cache.put(sample(c, 0.5, vec![1.0; 4]));

        assert_eq!(cache.stats().heuristic_count, 2);
        assert!(cache.entries.peek(&a).is_none());
    }

    #[test]
    fn test_find_matching_excludes_frozen_and_low_confidence() {
        let mut cache = HeuristicCache::new(&CacheConfig { max_heuristics: 10 });
        let mut frozen = sample(Uuid::new_v4(), 0.9, vec![1.0, 0.0, 0.0, 0.0]);
        frozen.frozen = true;
        let mut low_conf = sample(Uuid::new_v4(), 0.1, vec![1.0, 0.0, 0.0, 0.0]);
        low_conf.confidence = 0.1;
        let good = sample(Uuid::new_v4(), 0.9, vec![1.0, 0.0, 0.0, 0.0]);

        cache.put(frozen);
        cache.put(low_conf);
        cache.put(good.clone());

        let matches = cache.find_matching(&[1.0, 0.0, 0.0, 0.0], 0.5, 0.5, 10);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0, good.id);
    }

    #[test]
    fn test_flush_clears_all() {
        let mut cache = HeuristicCache::new(&CacheConfig { max_heuristics: 10 });
        cache.put(sample(Uuid::new_v4(), 0.5, vec![1.0; 4]));
        cache.put(sample(Uuid::new_v4(), 0.5, vec![1.0; 4]));
        assert_eq!(cache.flush(), 2);
        assert_eq!(cache.stats().heuristic_count, 0);
    }
}
