//! The text-generation backend is an external collaborator, never implemented here.
//!
//! `TextGenerationBackend` is the narrow interface Executive talks to it
//! through. `HttpBackend` speaks a small JSON-over-HTTP protocol (prompt in,
//! generated text out) compatible with a local Ollama-style server.
//! `NullBackend` stands in when no backend is configured, so the LLM branch
//! degrades to "unavailable" instead of failing the whole call.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::prompts::strip_code_fence;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no text generation backend configured")]
    NotConfigured,
    #[error("text generation backend request failed: {0}")]
    Request(String),
    #[error("text generation backend returned status {0}: {1}")]
    ApiStatus(u16, String),
    #[error("text generation backend returned malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait TextGenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, BackendError>;

    /// Calls `generate` with a JSON-formatted request and parses the result.
    async fn extract_json(&self, system_prompt: &str, user_prompt: &str) -> Result<Value, BackendError> {
        let raw = self.generate(user_prompt, Some(system_prompt)).await?;
        let cleaned = strip_code_fence(&raw);
        serde_json::from_str(&cleaned).map_err(|e| BackendError::Malformed(e.to_string()))
    }
}

#[derive(serde::Serialize)]
struct GenerateRequestBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct GenerateResponseBody {
    #[serde(default)]
    response: String,
}

/// Calls an Ollama-compatible `/api/generate` endpoint over HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), model: model.into() }
    }

    async fn call(&self, prompt: &str, system: Option<&str>, format: Option<&str>) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequestBody { model: &self.model, prompt, stream: false, system, format };
        let response = self.client.post(&url).json(&body).send().await.map_err(|e| BackendError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::ApiStatus(status, text));
        }

        let parsed: GenerateResponseBody = response.json().await.map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl TextGenerationBackend for HttpBackend {
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String, BackendError> {
        self.call(prompt, system, None).await
    }

    async fn extract_json(&self, system_prompt: &str, user_prompt: &str) -> Result<Value, BackendError> {
        let raw = self.call(user_prompt, Some(system_prompt), Some("json")).await?;
        let cleaned = strip_code_fence(&raw);
        serde_json::from_str(&cleaned).map_err(|e| BackendError::Malformed(e.to_string()))
    }
}

/// Always-unavailable backend, used when no backend is configured and in tests.
pub struct NullBackend;

#[async_trait]
impl TextGenerationBackend for NullBackend {
    async fn generate(&self, _prompt: &str, _system: Option<&str>) -> Result<String, BackendError> {
        Err(BackendError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_backend_is_always_unavailable() {
        let backend = NullBackend;
        assert!(matches!(backend.generate("hi", None).await, Err(BackendError::NotConfigured)));
        assert!(matches!(backend.extract_json("sys", "hi").await, Err(BackendError::NotConfigured)));
    }
}
