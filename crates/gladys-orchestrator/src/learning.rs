//! The Learning Module: turns feedback, timeouts, undos, and ignored fires
//! into confidence-update signals sent to Memory.
//!
//! The interpretation rules (what counts as positive/negative/neutral, and
//! under what strategy) are pluggable behind `LearningStrategy`; only the
//! Bayesian strategy is implemented, matching the confidence rule Memory
//! itself uses.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;
use uuid::Uuid;

use gladys_memory::client::MemoryClient;

use crate::config::LearningConfig;
use crate::outcome_watcher::OutcomeWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone)]
pub struct FeedbackSignal {
    pub signal_type: SignalType,
    pub heuristic_id: Uuid,
    pub event_id: String,
    pub source: String,
    pub magnitude: f32,
}

#[derive(Debug, Clone)]
pub struct BayesianStrategyConfig {
    pub undo_window_sec: f64,
    pub ignored_threshold: u32,
    pub undo_keywords: Vec<String>,
    pub implicit_magnitude: f32,
    pub explicit_magnitude: f32,
}

impl From<&LearningConfig> for BayesianStrategyConfig {
    fn from(c: &LearningConfig) -> Self {
        Self {
            undo_window_sec: c.undo_window_sec,
            ignored_threshold: c.ignored_threshold,
            undo_keywords: c.undo_keywords.clone(),
            implicit_magnitude: c.implicit_magnitude,
            explicit_magnitude: c.explicit_magnitude,
        }
    }
}

/// A record of a heuristic having fired, kept around long enough to
/// recognize an undo or a follow-up event from the same source.
#[derive(Debug, Clone)]
pub struct FireRecord {
    pub heuristic_id: Uuid,
    pub event_id: String,
    pub fire_time_ms: i64,
    pub condition_text: String,
    pub predicted_success: f32,
    pub source: String,
}

/// Pure decision logic for turning raw signals (explicit feedback, a
/// timeout, an event that might be an undo, an ignored fire) into a
/// `FeedbackSignal`. Kept free of any I/O so it can be unit tested without a
/// Memory client.
pub trait LearningStrategy: Send + Sync {
    fn interpret_explicit_feedback(&self, heuristic_id: Uuid, event_id: &str, positive: bool) -> FeedbackSignal;
    fn interpret_timeout(&self, heuristic_id: Uuid, event_id: &str) -> FeedbackSignal;
    fn interpret_event_for_undo(&self, fire: &FireRecord, event_text: &str, event_source: &str) -> Option<FeedbackSignal>;
    fn interpret_ignore(&self, heuristic_id: Uuid, event_id: &str) -> FeedbackSignal;
    fn config(&self) -> &BayesianStrategyConfig;
}

pub struct BayesianStrategy {
    config: BayesianStrategyConfig,
}

impl BayesianStrategy {
    pub fn new(config: BayesianStrategyConfig) -> Self {
        Self { config }
    }
}

impl LearningStrategy for BayesianStrategy {
    fn interpret_explicit_feedback(&self, heuristic_id: Uuid, event_id: &str, positive: bool) -> FeedbackSignal {
        FeedbackSignal {
            signal_type: if positive { SignalType::Positive } else { SignalType::Negative },
            heuristic_id,
            event_id: event_id.to_string(),
            source: "explicit".to_string(),
            magnitude: self.config.explicit_magnitude,
        }
    }

    fn interpret_timeout(&self, heuristic_id: Uuid, event_id: &str) -> FeedbackSignal {
        FeedbackSignal {
            signal_type: SignalType::Positive,
            heuristic_id,
            event_id: event_id.to_string(),
            source: "implicit_timeout".to_string(),
            magnitude: self.config.implicit_magnitude,
        }
    }

    fn interpret_event_for_undo(&self, fire: &FireRecord, event_text: &str, event_source: &str) -> Option<FeedbackSignal> {
        if fire.source != event_source {
            return None;
        }
        let text_lower = event_text.to_lowercase();
        let is_undo = self.config.undo_keywords.iter().any(|kw| text_lower.contains(kw.as_str()));
        if !is_undo {
            return None;
        }
        Some(FeedbackSignal {
            signal_type: SignalType::Negative,
            heuristic_id: fire.heuristic_id,
            event_id: fire.event_id.clone(),
            source: "implicit_undo".to_string(),
            magnitude: self.config.implicit_magnitude,
        })
    }

    fn interpret_ignore(&self, heuristic_id: Uuid, event_id: &str) -> FeedbackSignal {
        FeedbackSignal {
            signal_type: SignalType::Negative,
            heuristic_id,
            event_id: event_id.to_string(),
            source: "implicit_ignored".to_string(),
            magnitude: self.config.implicit_magnitude,
        }
    }

    fn config(&self) -> &BayesianStrategyConfig {
        &self.config
    }
}

#[derive(Debug, Error)]
pub enum LearningError {
    #[error("unknown learning strategy: {0}")]
    UnknownStrategy(String),
}

pub fn create_learning_strategy(name: &str, config: BayesianStrategyConfig) -> Result<Box<dyn LearningStrategy>, LearningError> {
    match name {
        "bayesian" => Ok(Box::new(BayesianStrategy::new(config))),
        other => Err(LearningError::UnknownStrategy(other.to_string())),
    }
}

/// Turns feedback signals, timeouts, undos, and ignored fires into
/// confidence updates on Memory, and tracks recently-fired heuristics long
/// enough to recognize those implicit signals.
pub struct LearningModule {
    strategy: Box<dyn LearningStrategy>,
    memory: Arc<AsyncMutex<MemoryClient>>,
    outcome_watcher: Arc<OutcomeWatcher>,
    recent_fires: std::sync::Mutex<Vec<FireRecord>>,
    acknowledged_fires: std::sync::Mutex<HashSet<(Uuid, String)>>,
    ignore_counts: std::sync::Mutex<HashMap<Uuid, u32>>,
}

impl LearningModule {
    pub fn new(strategy: Box<dyn LearningStrategy>, memory: Arc<AsyncMutex<MemoryClient>>, outcome_watcher: Arc<OutcomeWatcher>) -> Self {
        Self {
            strategy,
            memory,
            outcome_watcher,
            recent_fires: std::sync::Mutex::new(Vec::new()),
            acknowledged_fires: std::sync::Mutex::new(HashSet::new()),
            ignore_counts: std::sync::Mutex::new(HashMap::new()),
        }
    }

    async fn apply_signal(&self, signal: FeedbackSignal) {
        if signal.signal_type == SignalType::Neutral {
            return;
        }
        let positive = signal.signal_type == SignalType::Positive;
        let mut memory = self.memory.lock().await;
        if let Err(e) = memory.update_heuristic_confidence(signal.heuristic_id, positive, &signal.source).await {
            warn!(heuristic_id = %signal.heuristic_id, error = %e, "failed to apply learning signal");
        }
    }

    /// Explicit feedback on a specific response: apply immediately and stop
    /// tracking this fire for implicit signals.
    pub async fn on_feedback(&self, heuristic_id: Uuid, event_id: &str, positive: bool) {
        let signal = self.strategy.interpret_explicit_feedback(heuristic_id, event_id, positive);
        self.apply_signal(signal).await;
        self.acknowledged_fires.lock().expect("lock poisoned").insert((heuristic_id, event_id.to_string()));
        self.ignore_counts.lock().expect("lock poisoned").remove(&heuristic_id);
    }

    /// A heuristic fired in response to an event: record it with Memory and
    /// start tracking it for undo/ignore/outcome signals.
    pub async fn on_fire(&self, heuristic_id: Uuid, event_id: &str, predicted_success: f32, condition_text: &str, source: &str, now_ms: i64) {
        {
            let mut memory = self.memory.lock().await;
            if let Err(e) = memory.record_heuristic_fire(heuristic_id, event_id, None).await {
                warn!(heuristic_id = %heuristic_id, error = %e, "failed to record heuristic fire");
            }
        }
        self.outcome_watcher.register_fire(heuristic_id, event_id, predicted_success, condition_text, now_ms);
        self.recent_fires.lock().expect("lock poisoned").push(FireRecord {
            heuristic_id,
            event_id: event_id.to_string(),
            fire_time_ms: now_ms,
            condition_text: condition_text.to_string(),
            predicted_success,
            source: source.to_string(),
        });
    }

    /// Run every newly-ingested event through the three implicit-signal
    /// checks: outcome confirmation, undo detection, and ignored-fire
    /// detection against fires from the same source.
    pub async fn check_event_for_outcomes(&self, event_text: &str, event_source: &str, now_ms: i64) {
        for heuristic_id in self.outcome_watcher.check_event(event_text) {
            let signal = FeedbackSignal {
                signal_type: SignalType::Positive,
                heuristic_id,
                event_id: String::new(),
                source: "implicit_outcome".to_string(),
                magnitude: self.strategy.config().implicit_magnitude,
            };
            self.apply_signal(signal).await;
        }
        self.check_undo_signal(event_text, event_source, now_ms).await;
        self.check_ignored_fires(event_source, now_ms).await;
    }

    async fn check_undo_signal(&self, event_text: &str, event_source: &str, now_ms: i64) {
        let window_ms = (self.strategy.config().undo_window_sec * 1000.0) as i64;
        let candidates: Vec<FireRecord> = {
            let fires = self.recent_fires.lock().expect("lock poisoned");
            fires.iter().filter(|f| now_ms - f.fire_time_ms <= window_ms).cloned().collect()
        };
        for fire in candidates {
            if let Some(signal) = self.strategy.interpret_event_for_undo(&fire, event_text, event_source) {
                self.apply_signal(signal).await;
            }
        }
    }

    async fn check_ignored_fires(&self, event_source: &str, now_ms: i64) {
        let window_ms = (self.strategy.config().undo_window_sec * 1000.0) as i64;
        let ignored: Vec<FireRecord> = {
            let mut fires = self.recent_fires.lock().expect("lock poisoned");
            let acknowledged = self.acknowledged_fires.lock().expect("lock poisoned");
            let (ignored, kept): (Vec<FireRecord>, Vec<FireRecord>) = fires.drain(..).partition(|f| {
                f.source == event_source
                    && now_ms - f.fire_time_ms <= window_ms
                    && !acknowledged.contains(&(f.heuristic_id, f.event_id.clone()))
            });
            *fires = kept;
            ignored
        };
        for fire in ignored {
            self.on_heuristic_ignored(fire.heuristic_id, &fire.event_id).await;
        }
    }

    /// A heuristic fired without ever getting feedback; count it, and once
    /// `ignored_threshold` consecutive ignores accumulate, emit a single
    /// negative signal and reset the counter.
    pub async fn on_heuristic_ignored(&self, heuristic_id: Uuid, event_id: &str) {
        let threshold = self.strategy.config().ignored_threshold;
        let fire_signal = {
            let mut counts = self.ignore_counts.lock().expect("lock poisoned");
            let count = counts.entry(heuristic_id).or_insert(0);
            *count += 1;
            if *count >= threshold {
                *count = 0;
                true
            } else {
                false
            }
        };
        if fire_signal {
            let signal = self.strategy.interpret_ignore(heuristic_id, event_id);
            self.apply_signal(signal).await;
        }
    }

    /// Periodic sweep: flush expired outcome expectations as implicit
    /// positives, and purge fire-tracking state older than the undo window.
    pub async fn cleanup_expired(&self, now_ms: i64) {
        let expired = self.outcome_watcher.get_expired_items(now_ms);
        self.outcome_watcher.cleanup_expired(now_ms);
        for (heuristic_id, event_id) in expired {
            let signal = self.strategy.interpret_timeout(heuristic_id, &event_id);
            self.apply_signal(signal).await;
        }

        let window_ms = (self.strategy.config().undo_window_sec * 1000.0) as i64;
        self.recent_fires.lock().expect("lock poisoned").retain(|f| now_ms - f.fire_time_ms <= window_ms);
        self.acknowledged_fires.lock().expect("lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> BayesianStrategy {
        BayesianStrategy::new(BayesianStrategyConfig {
            undo_window_sec: 30.0,
            ignored_threshold: 3,
            undo_keywords: vec!["undo".to_string(), "nevermind".to_string()],
            implicit_magnitude: 1.0,
            explicit_magnitude: 0.8,
        })
    }

    #[test]
    fn test_explicit_feedback_maps_to_signal_type() {
        let s = strategy();
        let id = Uuid::new_v4();
        assert_eq!(s.interpret_explicit_feedback(id, "e1", true).signal_type, SignalType::Positive);
        assert_eq!(s.interpret_explicit_feedback(id, "e1", false).signal_type, SignalType::Negative);
    }

    #[test]
    fn test_timeout_is_always_positive() {
        let s = strategy();
        assert_eq!(s.interpret_timeout(Uuid::new_v4(), "e1").signal_type, SignalType::Positive);
    }

    #[test]
    fn test_undo_requires_keyword_and_matching_source() {
        let s = strategy();
        let fire = FireRecord {
            heuristic_id: Uuid::new_v4(),
            event_id: "e1".to_string(),
            fire_time_ms: 0,
            condition_text: "lights on".to_string(),
            predicted_success: 0.8,
            source: "lights".to_string(),
        };
        assert!(s.interpret_event_for_undo(&fire, "please undo that", "lights").is_some());
        assert!(s.interpret_event_for_undo(&fire, "turn them brighter", "lights").is_none());
        assert!(s.interpret_event_for_undo(&fire, "undo that", "kitchen").is_none());
    }

    #[test]
    fn test_create_learning_strategy_rejects_unknown_name() {
        let config = BayesianStrategyConfig {
            undo_window_sec: 30.0,
            ignored_threshold: 3,
            undo_keywords: vec![],
            implicit_magnitude: 1.0,
            explicit_magnitude: 0.8,
        };
        assert!(create_learning_strategy("bayesian", config.clone()).is_ok());
        assert!(create_learning_strategy("td_learning", config).is_err());
    }
}
