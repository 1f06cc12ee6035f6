//! Entry point for the Orchestrator's gRPC server.

use tonic::transport::Server;
use tracing::info;

use gladys_memory::client::{ClientConfig, MemoryClient};
use gladys_orchestrator::client::{ExecutiveClient, ExecutiveClientConfig};
use gladys_orchestrator::config::Config;
use gladys_orchestrator::server::{build_learning_strategy, build_outcome_watcher, OrchestratorService};
use gladys_proto::orchestrator::orchestrator_server::OrchestratorServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = gladys_common::setup_logging("gladys-orchestrator");

    let config = Config::from_env();
    config.log_config();

    let memory = MemoryClient::connect(ClientConfig { address: config.server.memory_storage_address.clone(), ..Default::default() }).await?;
    let executive = ExecutiveClient::connect(ExecutiveClientConfig { address: config.server.executive_address.clone(), ..Default::default() }).await?;

    let outcome_watcher = build_outcome_watcher(&config);
    let strategy = build_learning_strategy(&config)?;

    let addr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let service = OrchestratorService::new(config, memory, executive, outcome_watcher, strategy);

    info!(%addr, "starting Orchestrator gRPC server");
    Server::builder().add_service(OrchestratorServer::new(service)).serve(addr).await?;

    Ok(())
}
