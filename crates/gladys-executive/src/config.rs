//! Configuration for the Executive service.
//!
//! All configuration values can be set via environment variables, following
//! the default-with-env-override pattern used across every GLADyS service.

use gladys_common::env::{env_or, env_or_string};

/// Server configuration for the gRPC service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub memory_storage_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env_or_string("GRPC_HOST", "0.0.0.0"),
            port: env_or("EXECUTIVE_PORT", 50053),
            memory_storage_address: env_or_string("MEMORY_STORAGE_ADDRESS", "http://localhost:50051"),
        }
    }
}

/// The text-generation backend Executive calls out to.
///
/// `base_url` is empty when no backend is configured, in which case
/// `build_backend` wires up a `NullBackend` instead of an HTTP client.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: env_or_string("EXECUTIVE_BACKEND_BASE_URL", ""),
            api_key: env_or_string("EXECUTIVE_BACKEND_API_KEY", ""),
            model: env_or_string("EXECUTIVE_BACKEND_MODEL", "gemma:2b"),
            request_timeout_secs: env_or("EXECUTIVE_BACKEND_TIMEOUT_SECS", 60),
        }
    }
}

impl BackendConfig {
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }
}

/// Decision thresholds and trace bookkeeping.
#[derive(Debug, Clone)]
pub struct ExecutiveConfig {
    /// Fast-path cutoff: a suggestion at or above this confidence skips the LLM.
    pub heuristic_confidence_threshold: f32,
    /// How long a `ReasoningTrace` survives waiting for feedback.
    pub trace_retention_sec: i64,
    /// Reasoning trace count above which an opportunistic sweep runs.
    pub trace_sweep_threshold: usize,
}

impl Default for ExecutiveConfig {
    fn default() -> Self {
        Self {
            heuristic_confidence_threshold: env_or("EXECUTIVE_HEURISTIC_THRESHOLD", 0.7),
            trace_retention_sec: env_or("EXECUTIVE_TRACE_RETENTION_SEC", 300),
            trace_sweep_threshold: env_or("EXECUTIVE_TRACE_SWEEP_THRESHOLD", 100),
        }
    }
}

/// Root configuration that aggregates all config sections.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub executive: ExecutiveConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn log_config(&self) {
        tracing::info!(
            server_host = %self.server.host,
            server_port = self.server.port,
            backend_configured = self.backend.is_configured(),
            backend_model = %self.backend.model,
            heuristic_confidence_threshold = self.executive.heuristic_confidence_threshold,
            trace_retention_sec = self.executive.trace_retention_sec,
            "Executive configuration loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 50053);
        assert!(!config.backend.is_configured());
        assert!((config.executive.heuristic_confidence_threshold - 0.7).abs() < 0.001);
        assert_eq!(config.executive.trace_retention_sec, 300);
    }
}
