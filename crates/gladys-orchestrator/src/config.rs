//! Configuration for the Orchestrator service.
//!
//! Same default-with-env-override pattern as every other GLADyS service's
//! config module, built on `gladys_common::env`.

use std::time::Duration;

use gladys_common::env::{env_csv, env_or, env_or_string};

/// Server + downstream RPC targets.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_workers: usize,
    pub memory_storage_address: String,
    pub executive_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env_or_string("GRPC_HOST", "0.0.0.0"),
            port: env_or("ORCHESTRATOR_PORT", 50050),
            max_workers: env_or("ORCHESTRATOR_MAX_WORKERS", 10),
            memory_storage_address: env_or_string(
                "MEMORY_STORAGE_ADDRESS",
                "http://localhost:50051",
            ),
            executive_address: env_or_string("EXECUTIVE_ADDRESS", "http://localhost:50053"),
        }
    }
}

/// Salience-based routing thresholds.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Legacy moment-accumulator tick. Parsed and logged for compatibility;
    /// has no behavioral effect since the accumulator path is not implemented.
    pub moment_window_ms: u64,
    /// Retained for wire/config compatibility; unused by default routing,
    /// which enqueues every non-emergency event rather than batching by a
    /// salience cutoff.
    pub high_salience_threshold: f32,
    pub emergency_confidence_threshold: f32,
    pub emergency_threat_threshold: f32,
    /// Upper bound on how many matches Memory is asked for per event; the
    /// best becomes the primary suggestion, the rest ride along as `candidates`.
    pub max_evaluation_candidates: i32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            moment_window_ms: env_or("moment_window_ms", 100),
            high_salience_threshold: env_or("high_salience_threshold", 0.7),
            emergency_confidence_threshold: env_or("emergency_confidence_threshold", 0.95),
            emergency_threat_threshold: env_or("emergency_threat_threshold", 0.9),
            max_evaluation_candidates: env_or("max_evaluation_candidates", 5),
        }
    }
}

/// Priority-queue worker + timeout-scanner configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub event_timeout_ms: i64,
    pub timeout_scan_interval_ms: u64,
    pub heartbeat_timeout_sec: u64,
    pub health_check_interval_sec: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            event_timeout_ms: env_or("event_timeout_ms", 30_000),
            timeout_scan_interval_ms: env_or("timeout_scan_interval_ms", 2_000),
            heartbeat_timeout_sec: env_or("heartbeat_timeout_sec", 30),
            health_check_interval_sec: env_or("health_check_interval_sec", 10),
        }
    }
}

impl QueueConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_scan_interval_ms)
    }
}

/// Outcome Watcher configuration.
#[derive(Debug, Clone)]
pub struct OutcomeConfig {
    pub enabled: bool,
    pub cleanup_interval_sec: u64,
    pub outcome_timeout_sec: i64,
    /// Raw JSON array of `{trigger_pattern, outcome_pattern}` pairs. Parsed
    /// by `outcome_watcher::parse_patterns`; an empty list (with a logged
    /// warning) is used if parsing fails.
    pub outcome_patterns_json: String,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            enabled: env_or("outcome_watcher_enabled", true),
            cleanup_interval_sec: env_or("outcome_cleanup_interval_sec", 30),
            outcome_timeout_sec: env_or("outcome_timeout_sec", 120),
            outcome_patterns_json: env_or_string("outcome_patterns_json", "[]"),
        }
    }
}

impl OutcomeConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_sec)
    }
}

/// Learning Module strategy configuration.
#[derive(Debug, Clone)]
pub struct LearningConfig {
    pub strategy: String,
    pub undo_window_sec: f64,
    pub ignored_threshold: u32,
    pub undo_keywords: Vec<String>,
    pub implicit_magnitude: f32,
    pub explicit_magnitude: f32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            strategy: env_or_string("learning_strategy", "bayesian"),
            undo_window_sec: env_or("learning_undo_window_sec", 30.0),
            ignored_threshold: env_or("learning_ignored_threshold", 3),
            undo_keywords: env_csv(
                "learning_undo_keywords",
                &["undo", "revert", "cancel", "rollback", "nevermind", "never mind"],
            ),
            implicit_magnitude: env_or("learning_implicit_magnitude", 1.0),
            explicit_magnitude: env_or("learning_explicit_magnitude", 0.8),
        }
    }
}

/// Root configuration that aggregates all config sections.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub routing: RoutingConfig,
    pub queue: QueueConfig,
    pub outcome: OutcomeConfig,
    pub learning: LearningConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn log_config(&self) {
        tracing::info!(
            server_host = %self.server.host,
            server_port = self.server.port,
            memory_storage_address = %self.server.memory_storage_address,
            executive_address = %self.server.executive_address,
            moment_window_ms = self.routing.moment_window_ms,
            emergency_confidence_threshold = self.routing.emergency_confidence_threshold,
            emergency_threat_threshold = self.routing.emergency_threat_threshold,
            event_timeout_ms = self.queue.event_timeout_ms,
            outcome_watcher_enabled = self.outcome.enabled,
            learning_strategy = %self.learning.strategy,
            "Orchestrator configuration loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 50050);
        assert!((config.routing.high_salience_threshold - 0.7).abs() < 0.001);
        assert_eq!(config.queue.event_timeout_ms, 30_000);
        assert!(config.outcome.enabled);
        assert_eq!(config.learning.strategy, "bayesian");
        assert_eq!(config.learning.undo_keywords[0], "undo");
    }
}
