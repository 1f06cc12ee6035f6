//! `queue stats|list|watch`: thin client over the Orchestrator's queue
//! introspection RPCs.

use std::time::Duration;

use anyhow::{Context, Result};
use tonic::transport::Channel;

use gladys_proto::orchestrator::orchestrator_client::OrchestratorClient;
use gladys_proto::orchestrator::{GetQueueStatsRequest, ListQueuedEventsRequest};

use crate::config::CliConfig;

async fn connect(config: &CliConfig) -> Result<OrchestratorClient<Channel>> {
    let channel = Channel::from_shared(config.orchestrator_address.clone())?.connect().await.context("connecting to orchestrator")?;
    Ok(OrchestratorClient::new(channel))
}

pub async fn stats(config: &CliConfig) -> Result<()> {
    let mut client = connect(config).await?;
    let stats = client.get_queue_stats(GetQueueStatsRequest {}).await?.into_inner();
    println!("queue_size      = {}", stats.queue_size);
    println!("total_queued    = {}", stats.total_queued);
    println!("total_processed = {}", stats.total_processed);
    println!("total_timed_out = {}", stats.total_timed_out);
    Ok(())
}

pub async fn list(config: &CliConfig, limit: i32) -> Result<()> {
    let mut client = connect(config).await?;
    let response = client.list_queued_events(ListQueuedEventsRequest { limit }).await?.into_inner();
    if response.items.is_empty() {
        println!("(queue is empty)");
        return Ok(());
    }
    for item in response.items {
        println!(
            "{}  source={}  priority={:.2}  enqueued_at_ms={}  heuristic={}",
            item.event_id, item.source, item.salience_priority, item.enqueued_at_ms, item.matched_heuristic_id
        );
    }
    Ok(())
}

/// Polls queue stats once a second until interrupted. Returns `true` if the
/// caller should exit 130 (interrupted) rather than 0.
pub async fn watch(config: &CliConfig) -> Result<bool> {
    let mut client = connect(config).await?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(true),
            stats = client.get_queue_stats(GetQueueStatsRequest {}) => {
                let stats = stats?.into_inner();
                println!(
                    "size={} queued={} processed={} timed_out={}",
                    stats.queue_size, stats.total_queued, stats.total_processed, stats.total_timed_out
                );
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
