//! `cache stats|list|flush|evict`: thin client over the Memory service's
//! cache introspection RPCs.

use anyhow::{Context, Result};
use uuid::Uuid;

use gladys_memory::client::{ClientConfig, MemoryClient};

use crate::config::CliConfig;

async fn connect(config: &CliConfig) -> Result<MemoryClient> {
    MemoryClient::connect(ClientConfig { address: config.memory_address.clone(), ..Default::default() })
        .await
        .context("connecting to memory service")
}

pub async fn stats(config: &CliConfig) -> Result<()> {
    let mut client = connect(config).await?;
    let stats = client.get_cache_stats().await.context("fetching cache stats")?;
    println!("heuristic_count = {}", stats.heuristic_count);
    println!("max_heuristics  = {}", stats.max_heuristics);
    println!("total_hits      = {}", stats.total_hits);
    println!("total_misses    = {}", stats.total_misses);
    println!("hit_rate        = {:.3}", stats.hit_rate);
    Ok(())
}

pub async fn list(config: &CliConfig, limit: i32) -> Result<()> {
    let mut client = connect(config).await?;
    let heuristics = client.list_cached_heuristics(limit).await.context("listing cached heuristics")?;
    if heuristics.is_empty() {
        println!("(cache is empty)");
        return Ok(());
    }
    for h in heuristics {
        println!("{}  conf={:.2}  fires={}/{}  {}", h.id, h.confidence, h.success_count, h.fire_count, h.condition_text);
    }
    Ok(())
}

pub async fn flush(config: &CliConfig) -> Result<()> {
    let mut client = connect(config).await?;
    let evicted = client.flush_cache().await.context("flushing cache")?;
    println!("evicted {evicted} heuristics");
    Ok(())
}

pub async fn evict(config: &CliConfig, heuristic_id: &str) -> Result<()> {
    let id = Uuid::parse_str(heuristic_id).context("parsing heuristic id")?;
    let mut client = connect(config).await?;
    let evicted = client.evict_from_cache(id).await.context("evicting from cache")?;
    if evicted {
        println!("evicted {id}");
    } else {
        println!("{id} was not in the cache");
    }
    Ok(())
}
