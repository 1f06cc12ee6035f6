//! Entry point for the Memory service's gRPC server.

use std::sync::Arc;

use tonic::transport::Server;
use tracing::{info, warn};

use gladys_memory::config::Config;
use gladys_memory::embedding_provider::{DeterministicEmbeddingProvider, EmbeddingProvider, HttpEmbeddingProvider};
use gladys_memory::postgres_store::PostgresStore;
use gladys_memory::store::{InMemoryStore, PersistentStore};
use gladys_memory::MemoryService;
use gladys_proto::memory::memory_storage_server::MemoryStorageServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = gladys_common::setup_logging("gladys-memory");

    let config = Config::from_env();
    config.log_config();

    let store: Arc<dyn PersistentStore> = match PostgresStore::connect(&config.database).await {
        Ok(store) => {
            store.migrate().await?;
            info!("connected to Postgres");
            Arc::new(store)
        }
        Err(e) => {
            warn!(error = %e, "Postgres unavailable, falling back to in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    let embedding_url = std::env::var("EMBEDDING_SERVICE_URL").ok();
    let embeddings: Arc<dyn EmbeddingProvider> = match embedding_url {
        Some(url) => {
            info!(url = %url, "using HTTP embedding provider");
            Arc::new(HttpEmbeddingProvider::new(url))
        }
        None => {
            warn!("EMBEDDING_SERVICE_URL not set, using deterministic fallback embeddings");
            Arc::new(DeterministicEmbeddingProvider::new(config.matching.embedding_dim))
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let service = MemoryService::new(store, embeddings, config);

    info!(%addr, "starting Memory gRPC server");
    Server::builder().add_service(MemoryStorageServer::new(service)).serve(addr).await?;

    Ok(())
}
