//! gRPC client for the Executive service.

use std::time::Duration;

use thiserror::Error;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;
use tracing::{debug, instrument};

use gladys_common::logging::{attach_trace_id, get_or_create_trace_id};
use gladys_proto::executive::executive_client::ExecutiveClient as GeneratedExecutiveClient;
use gladys_proto::executive::{
    GetHealthRequest, HeuristicSuggestion, ProcessEventRequest, ProcessEventResponse,
    ProvideFeedbackRequest,
};
use gladys_proto::types::EpisodicEvent;

#[derive(Error, Debug)]
pub enum ExecutiveClientError {
    #[error("failed to connect to executive service: {0}")]
    ConnectionFailed(#[from] tonic::transport::Error),
    #[error("rpc failed: {0}")]
    RpcFailed(#[from] tonic::Status),
}

#[derive(Clone, Debug)]
pub struct ExecutiveClientConfig {
    pub address: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ExecutiveClientConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:50053".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Thin wrapper over the generated Executive client, adding trace-id
/// propagation the same way `gladys_memory::client::MemoryClient` does.
pub struct ExecutiveClient {
    client: GeneratedExecutiveClient<Channel>,
    config: ExecutiveClientConfig,
}

impl ExecutiveClient {
    #[instrument(skip_all, fields(address = %config.address))]
    pub async fn connect(config: ExecutiveClientConfig) -> Result<Self, ExecutiveClientError> {
        debug!("connecting to executive service");
        let endpoint = Endpoint::from_shared(config.address.clone())?
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout);
        let channel = endpoint.connect().await?;
        Ok(Self { client: GeneratedExecutiveClient::new(channel), config })
    }

    fn wrap<T>(&self, message: T) -> Request<T> {
        let request = Request::new(message);
        let id = get_or_create_trace_id(&request);
        attach_trace_id(request, &id)
    }

    #[instrument(skip(self, event, suggestion, candidates))]
    pub async fn process_event(
        &mut self,
        event: EpisodicEvent,
        immediate: bool,
        suggestion: Option<HeuristicSuggestion>,
        candidates: Vec<HeuristicSuggestion>,
    ) -> Result<ProcessEventResponse, ExecutiveClientError> {
        let has_suggestion = suggestion.is_some();
        let request = self.wrap(ProcessEventRequest {
            event: Some(event),
            immediate,
            suggestion,
            has_suggestion,
            candidates,
        });
        Ok(self.client.process_event(request).await?.into_inner())
    }

    #[instrument(skip(self))]
    pub async fn provide_feedback(&mut self, event_id: &str, response_id: &str, positive: bool) -> Result<(), ExecutiveClientError> {
        let request = self.wrap(ProvideFeedbackRequest {
            event_id: event_id.to_string(),
            response_id: response_id.to_string(),
            positive,
        });
        self.client.provide_feedback(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_health(&mut self) -> Result<bool, ExecutiveClientError> {
        let request = self.wrap(GetHealthRequest {});
        let response = self.client.get_health(request).await?.into_inner();
        Ok(response.status == "ok")
    }

    pub fn config(&self) -> &ExecutiveClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_config() {
        let config = ExecutiveClientConfig::default();
        assert_eq!(config.address, "http://localhost:50053");
    }
}
