//! Structured logging shared by the Orchestrator, Memory, and Executive services.
//!
//! Configuration via environment variables:
//!   LOG_LEVEL: trace, debug, info, warn, error (default: info)
//!   LOG_FORMAT: human, json (default: human)
//!   LOG_FILE: path to a log file (optional)

use std::env;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Guard for the non-blocking file writer. Must be held for the lifetime of the process.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize logging for a GLADyS service.
///
/// Returns a guard that must be held for the application lifetime to ensure
/// logs are flushed to file.
pub fn setup_logging(service_name: &str) -> LogGuard {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "human".to_string());
    let log_file = env::var("LOG_FILE").ok();

    let filter = env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("{}={}", service_name.replace('-', "_"), log_level));
    let env_filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_guard = match (log_format.as_str(), log_file) {
        ("json", Some(path)) => {
            let (non_blocking, guard) = file_writer(&path);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_target(false).with_file(false).with_line_number(false))
                .with(fmt::layer().json().with_writer(non_blocking).with_target(false).with_file(false).with_line_number(false))
                .init();
            Some(guard)
        }
        ("json", None) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_target(false).with_file(false).with_line_number(false))
                .init();
            None
        }
        (_, Some(path)) => {
            let (non_blocking, guard) = file_writer(&path);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_ansi(true).with_target(false).with_file(false).with_line_number(false))
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false).with_target(false).with_file(false).with_line_number(false))
                .init();
            Some(guard)
        }
        (_, None) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_ansi(true).with_target(false).with_file(false).with_line_number(false))
                .init();
            None
        }
    };

    tracing::info!(service = service_name, "Logging initialized");

    LogGuard { _file_guard: file_guard }
}

fn file_writer(path: &str) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
    let path = Path::new(path);
    let dir = path.parent().unwrap_or(Path::new("."));
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("service.log");
    let appender = tracing_appender::rolling::never(dir, filename);
    tracing_appender::non_blocking(appender)
}

/// Header name for the trace id propagated across RPCs.
pub const TRACE_ID_HEADER: &str = "x-gladys-trace-id";

/// Generate a new trace id: the first 12 hex characters of a random v4 UUID.
/// Random rather than timestamp-derived, so concurrent requests within the
/// same service tick can't collide on the low bits of a shared clock.
pub fn generate_trace_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}

/// Extract the trace id from request metadata, if present.
pub fn extract_trace_id<T>(request: &tonic::Request<T>) -> Option<String> {
    request
        .metadata()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Get the trace id from a request, or generate a fresh one.
pub fn get_or_create_trace_id<T>(request: &tonic::Request<T>) -> String {
    extract_trace_id(request).unwrap_or_else(generate_trace_id)
}

/// Attach a trace id to an outgoing request's metadata.
pub fn attach_trace_id<T>(mut request: tonic::Request<T>, trace_id: &str) -> tonic::Request<T> {
    if let Ok(value) = trace_id.parse() {
        request.metadata_mut().insert(TRACE_ID_HEADER, value);
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_trace_id_length() {
        let id = generate_trace_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_attach_and_extract_trace_id() {
        let request = tonic::Request::new(());
        let request = attach_trace_id(request, "abc123");
        assert_eq!(extract_trace_id(&request), Some("abc123".to_string()));
    }

    #[test]
    fn test_get_or_create_trace_id_generates_when_absent() {
        let request = tonic::Request::new(());
        let id = get_or_create_trace_id(&request);
        assert_eq!(id.len(), 12);
    }
}
