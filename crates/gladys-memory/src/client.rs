//! gRPC client for the Memory service, used by Orchestrator and Executive.

use std::time::Duration;

use thiserror::Error;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;
use tracing::{debug, instrument};
use uuid::Uuid;

use gladys_common::logging::{attach_trace_id, get_or_create_trace_id};
use gladys_common::{bytes_to_embedding, embedding_to_bytes};
use gladys_proto::memory::memory_storage_client::MemoryStorageClient;
use gladys_proto::memory::{
    EvictFromCacheRequest, FlushCacheRequest, GenerateEmbeddingRequest, GetCacheStatsRequest,
    GetHealthRequest, GetHeuristicRequest, GetPendingFiresRequest, ListCachedHeuristicsRequest,
    QueryByTimeRequest, QueryBySimilarityRequest, QueryHeuristicsRequest, QueryMatchingHeuristicsRequest,
    RecordHeuristicFireRequest, StoreEventRequest, StoreHeuristicRequest, UpdateFireOutcomeRequest,
    UpdateHeuristicConfidenceRequest,
};
use gladys_proto::types::{EpisodicEvent, Heuristic, HeuristicFire, HeuristicMatch};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("failed to connect to memory service: {0}")]
    ConnectionFailed(#[from] tonic::transport::Error),
    #[error("rpc failed: {0}")]
    RpcFailed(#[from] tonic::Status),
    #[error("memory service returned error: {0}")]
    ServiceError(String),
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub address: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:50051".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Thin wrapper over the generated `MemoryStorageClient`, adding trace-id
/// propagation and turning the response `.error` convention into `Result`.
pub struct MemoryClient {
    client: MemoryStorageClient<Channel>,
    config: ClientConfig,
    trace_id: Option<String>,
}

impl MemoryClient {
    #[instrument(skip_all, fields(address = %config.address))]
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        debug!("connecting to memory service");
        let endpoint = Endpoint::from_shared(config.address.clone())?
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout);
        let channel = endpoint.connect().await?;
        Ok(Self { client: MemoryStorageClient::new(channel), config, trace_id: None })
    }

    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    fn wrap<T>(&self, message: T) -> Request<T> {
        let request = Request::new(message);
        match &self.trace_id {
            Some(id) => attach_trace_id(request, id),
            None => {
                let id = get_or_create_trace_id(&request);
                attach_trace_id(request, &id)
            }
        }
    }

    #[instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn store_event(&mut self, event: EpisodicEvent) -> Result<(), ClientError> {
        let request = self.wrap(StoreEventRequest { event: Some(event) });
        let response = self.client.store_event(request).await?.into_inner();
        if !response.success {
            return Err(ClientError::ServiceError(response.error));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn query_by_time(
        &mut self,
        start_ms: i64,
        end_ms: i64,
        source_filter: Option<&str>,
        limit: i32,
    ) -> Result<Vec<EpisodicEvent>, ClientError> {
        let request = self.wrap(QueryByTimeRequest {
            start_ms,
            end_ms,
            source_filter: source_filter.unwrap_or("").to_string(),
            limit,
        });
        let response = self.client.query_by_time(request).await?.into_inner();
        if !response.error.is_empty() {
            return Err(ClientError::ServiceError(response.error));
        }
        Ok(response.events)
    }

    #[instrument(skip(self, query_embedding))]
    pub async fn query_by_similarity(
        &mut self,
        query_embedding: &[f32],
        similarity_threshold: f32,
        time_filter_hours: Option<i64>,
        limit: i32,
    ) -> Result<Vec<EpisodicEvent>, ClientError> {
        let request = self.wrap(QueryBySimilarityRequest {
            query_embedding: embedding_to_bytes(query_embedding),
            similarity_threshold,
            time_filter_hours: time_filter_hours.unwrap_or(0),
            limit,
        });
        let response = self.client.query_by_similarity(request).await?.into_inner();
        if !response.error.is_empty() {
            return Err(ClientError::ServiceError(response.error));
        }
        Ok(response.events)
    }

    #[instrument(skip(self, text))]
    pub async fn generate_embedding(&mut self, text: &str) -> Result<Vec<f32>, ClientError> {
        let request = self.wrap(GenerateEmbeddingRequest { text: text.to_string() });
        let response = self.client.generate_embedding(request).await?.into_inner();
        if !response.error.is_empty() {
            return Err(ClientError::ServiceError(response.error));
        }
        Ok(bytes_to_embedding(&response.embedding))
    }

    #[instrument(skip(self, heuristic), fields(heuristic_id = %heuristic.id))]
    pub async fn store_heuristic(&mut self, heuristic: Heuristic, generate_embedding: bool) -> Result<String, ClientError> {
        let request = self.wrap(StoreHeuristicRequest { heuristic: Some(heuristic), generate_embedding });
        let response = self.client.store_heuristic(request).await?.into_inner();
        if !response.success {
            return Err(ClientError::ServiceError(response.error));
        }
        Ok(response.heuristic_id)
    }

    #[instrument(skip(self))]
    pub async fn query_heuristics(&mut self, min_confidence: f32, limit: i32) -> Result<Vec<HeuristicMatch>, ClientError> {
        let request = self.wrap(QueryHeuristicsRequest {
            query_text: String::new(),
            query_embedding: Vec::new(),
            min_similarity: 0.0,
            min_confidence,
            limit,
        });
        let response = self.client.query_heuristics(request).await?.into_inner();
        if !response.error.is_empty() {
            return Err(ClientError::ServiceError(response.error));
        }
        Ok(response.matches)
    }

    #[instrument(skip(self, event_text))]
    pub async fn query_matching_heuristics(
        &mut self,
        event_text: &str,
        min_confidence: f32,
        limit: i32,
        source_filter: Option<&str>,
    ) -> Result<Vec<HeuristicMatch>, ClientError> {
        let request = self.wrap(QueryMatchingHeuristicsRequest {
            event_text: event_text.to_string(),
            min_confidence,
            limit,
            source_filter: source_filter.unwrap_or("").to_string(),
        });
        let response = self.client.query_matching_heuristics(request).await?.into_inner();
        if !response.error.is_empty() {
            return Err(ClientError::ServiceError(response.error));
        }
        Ok(response.matches)
    }

    #[instrument(skip(self))]
    pub async fn update_heuristic_confidence(
        &mut self,
        heuristic_id: Uuid,
        positive: bool,
        feedback_source: &str,
    ) -> Result<(f32, f32), ClientError> {
        let request = self.wrap(UpdateHeuristicConfidenceRequest {
            heuristic_id: heuristic_id.to_string(),
            positive,
            feedback_source: feedback_source.to_string(),
            learning_rate: 0.0,
            predicted_success: 0.0,
        });
        let response = self.client.update_heuristic_confidence(request).await?.into_inner();
        if !response.success {
            return Err(ClientError::ServiceError(response.error));
        }
        Ok((response.old_confidence, response.new_confidence))
    }

    #[instrument(skip(self))]
    pub async fn record_heuristic_fire(
        &mut self,
        heuristic_id: Uuid,
        event_id: &str,
        episodic_event_id: Option<&str>,
    ) -> Result<Uuid, ClientError> {
        let request = self.wrap(RecordHeuristicFireRequest {
            heuristic_id: heuristic_id.to_string(),
            event_id: event_id.to_string(),
            episodic_event_id: episodic_event_id.unwrap_or("").to_string(),
        });
        let response = self.client.record_heuristic_fire(request).await?.into_inner();
        if !response.error.is_empty() {
            return Err(ClientError::ServiceError(response.error));
        }
        Uuid::parse_str(&response.fire_id).map_err(|_| ClientError::ServiceError("invalid fire_id".into()))
    }

    #[instrument(skip(self))]
    pub async fn update_fire_outcome(&mut self, fire_id: Uuid, outcome: &str, feedback_source: &str) -> Result<(), ClientError> {
        let request = self.wrap(UpdateFireOutcomeRequest {
            fire_id: fire_id.to_string(),
            outcome: outcome.to_string(),
            feedback_source: feedback_source.to_string(),
        });
        let response = self.client.update_fire_outcome(request).await?.into_inner();
        if !response.success {
            return Err(ClientError::ServiceError(response.error));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_pending_fires(&mut self, heuristic_id: Option<Uuid>, max_age_ms: i64) -> Result<Vec<HeuristicFire>, ClientError> {
        let request = self.wrap(GetPendingFiresRequest {
            heuristic_id: heuristic_id.map(|id| id.to_string()).unwrap_or_default(),
            max_age_ms,
        });
        let response = self.client.get_pending_fires(request).await?.into_inner();
        if !response.error.is_empty() {
            return Err(ClientError::ServiceError(response.error));
        }
        Ok(response.fires)
    }

    #[instrument(skip(self))]
    pub async fn get_heuristic(&mut self, id: Uuid) -> Result<Heuristic, ClientError> {
        let request = self.wrap(GetHeuristicRequest { id: id.to_string() });
        let response = self.client.get_heuristic(request).await?.into_inner();
        response.heuristic.ok_or(ClientError::ServiceError(response.error))
    }

    #[instrument(skip(self))]
    pub async fn get_health(&mut self) -> Result<bool, ClientError> {
        let request = self.wrap(GetHealthRequest {});
        let response = self.client.get_health(request).await?.into_inner();
        Ok(response.status == "ok")
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[instrument(skip(self))]
    pub async fn get_cache_stats(&mut self) -> Result<RemoteCacheStats, ClientError> {
        let request = self.wrap(GetCacheStatsRequest {});
        let response = self.client.get_cache_stats(request).await?.into_inner();
        Ok(RemoteCacheStats {
            heuristic_count: response.heuristic_count,
            max_heuristics: response.max_heuristics,
            total_hits: response.total_hits,
            total_misses: response.total_misses,
            hit_rate: response.hit_rate,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_cached_heuristics(&mut self, limit: i32) -> Result<Vec<Heuristic>, ClientError> {
        let request = self.wrap(ListCachedHeuristicsRequest { limit });
        let response = self.client.list_cached_heuristics(request).await?.into_inner();
        Ok(response.heuristics)
    }

    #[instrument(skip(self))]
    pub async fn flush_cache(&mut self) -> Result<i64, ClientError> {
        let request = self.wrap(FlushCacheRequest {});
        let response = self.client.flush_cache(request).await?.into_inner();
        Ok(response.evicted_count)
    }

    #[instrument(skip(self))]
    pub async fn evict_from_cache(&mut self, heuristic_id: Uuid) -> Result<bool, ClientError> {
        let request = self.wrap(EvictFromCacheRequest { heuristic_id: heuristic_id.to_string() });
        let response = self.client.evict_from_cache(request).await?.into_inner();
        Ok(response.evicted)
    }
}

/// Snapshot of the Memory service's in-process heuristic cache, as seen by a remote caller.
#[derive(Debug, Clone, Copy)]
pub struct RemoteCacheStats {
    pub heuristic_count: i64,
    pub max_heuristics: i64,
    pub total_hits: i64,
    pub total_misses: i64,
    pub hit_rate: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.address, "http://localhost:50051");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }
}
