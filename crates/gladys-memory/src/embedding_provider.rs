//! The embedding model is an external collaborator, never implemented here.
//!
//! `EmbeddingProvider` is the narrow interface Memory talks to it through.
//! `HttpEmbeddingProvider` posts text to a configurable sidecar and expects
//! back a JSON array of floats. `DeterministicEmbeddingProvider` is a
//! dependency-free fallback used when no sidecar is configured, so
//! embedding-dependent paths still degrade gracefully instead of failing.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider request failed: {0}")]
    Request(String),
    #[error("embedding provider returned malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Calls an external embedding sidecar over HTTP.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[derive(serde::Serialize)]
struct EmbedRequestBody<'a> {
    text: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbedResponseBody {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequestBody { text })
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let body: EmbedResponseBody = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
        Ok(body.embedding)
    }
}

/// Hash-derived pseudo-embedding used when no sidecar is configured.
///
/// Not semantically meaningful, but stable (same text, same vector) and
/// normalized, so cosine-similarity-based matching keeps running rather
/// than failing outright during local development or sidecar outages.
pub struct DeterministicEmbeddingProvider {
    dim: usize,
}

impl DeterministicEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut seed: u64 = 1469598103934665603; // FNV offset basis
        for byte in text.bytes() {
            seed ^= byte as u64;
            seed = seed.wrapping_mul(1099511628211);
        }

        let mut vector = Vec::with_capacity(self.dim);
        let mut state = seed;
        for _ in 0..self.dim {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let bucket = ((state >> 33) & 0xffff) as f32 / 65535.0;
            vector.push(bucket * 2.0 - 1.0);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_embedding_is_stable() {
        let provider = DeterministicEmbeddingProvider::new(16);
        let a = provider.embed("turn off the oven").await.unwrap();
        let b = provider.embed("turn off the oven").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[tokio::test]
    async fn test_deterministic_embedding_differs_by_text() {
        let provider = DeterministicEmbeddingProvider::new(16);
        let a = provider.embed("turn off the oven").await.unwrap();
        let b = provider.embed("turn off the lights").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_deterministic_embedding_is_normalized() {
        let provider = DeterministicEmbeddingProvider::new(32);
        let v = provider.embed("a normalized vector please").await.unwrap();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }
}
