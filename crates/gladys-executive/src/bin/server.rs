//! Entry point for the Executive's gRPC server.

use std::sync::Arc;
use std::time::Duration;

use tonic::transport::Server;
use tracing::info;

use gladys_executive::backend::{HttpBackend, NullBackend, TextGenerationBackend};
use gladys_executive::config::Config;
use gladys_executive::server::ExecutiveService;
use gladys_memory::client::{ClientConfig, MemoryClient};
use gladys_proto::executive::executive_server::ExecutiveServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = gladys_common::setup_logging("gladys-executive");

    let config = Config::from_env();
    config.log_config();

    let memory = MemoryClient::connect(ClientConfig { address: config.server.memory_storage_address.clone(), ..Default::default() }).await?;

    let backend: Arc<dyn TextGenerationBackend> = if config.backend.is_configured() {
        Arc::new(HttpBackend::new(
            config.backend.base_url.clone(),
            config.backend.model.clone(),
            Duration::from_secs(config.backend.request_timeout_secs),
        ))
    } else {
        info!("no text generation backend configured, running with NullBackend");
        Arc::new(NullBackend)
    };

    let addr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let service = ExecutiveService::new(config, backend, memory);

    info!(%addr, "starting Executive gRPC server");
    Server::builder().add_service(ExecutiveServer::new(service)).serve(addr).await?;

    Ok(())
}
