//! `health` and `status` subcommands: thin RPC clients against each
//! service's `GetHealth`/`GetHealthDetails` surface.

use std::collections::BTreeMap;
use std::time::Duration;

use tonic::transport::Endpoint;

use gladys_proto::executive::executive_client::ExecutiveClient;
use gladys_proto::executive::GetHealthRequest as ExecutiveHealthRequest;
use gladys_proto::orchestrator::orchestrator_client::OrchestratorClient;
use gladys_proto::orchestrator::GetHealthRequest as OrchestratorHealthRequest;

use crate::config::CliConfig;

pub struct HealthReport {
    pub service: String,
    pub reachable: bool,
    pub status: String,
    pub details: BTreeMap<String, String>,
}

async fn connect(address: &str) -> Option<tonic::transport::Channel> {
    Endpoint::from_shared(address.to_string())
        .ok()?
        .connect_timeout(Duration::from_secs(2))
        .connect()
        .await
        .ok()
}

pub async fn check_memory(config: &CliConfig) -> HealthReport {
    let connect_config = gladys_memory::client::ClientConfig {
        address: config.memory_address.clone(),
        connect_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let mut client = match gladys_memory::client::MemoryClient::connect(connect_config).await {
        Ok(c) => c,
        Err(_) => return unreachable_report("memory"),
    };
    match client.get_health().await {
        Ok(ok) => HealthReport {
            service: "memory".to_string(),
            reachable: true,
            status: if ok { "ok".to_string() } else { "degraded".to_string() },
            details: BTreeMap::new(),
        },
        Err(_) => unreachable_report("memory"),
    }
}

pub async fn check_orchestrator(config: &CliConfig) -> HealthReport {
    let Some(channel) = connect(&config.orchestrator_address).await else {
        return unreachable_report("orchestrator");
    };
    let mut client = OrchestratorClient::new(channel);
    match client.get_health_details(OrchestratorHealthRequest {}).await {
        Ok(resp) => {
            let body = resp.into_inner();
            HealthReport { service: "orchestrator".to_string(), reachable: true, status: body.status, details: body.details.into_iter().collect() }
        }
        Err(_) => unreachable_report("orchestrator"),
    }
}

pub async fn check_executive(config: &CliConfig) -> HealthReport {
    let Some(channel) = connect(&config.executive_address).await else {
        return unreachable_report("executive");
    };
    let mut client = ExecutiveClient::new(channel);
    match client.get_health(ExecutiveHealthRequest {}).await {
        Ok(resp) => {
            let body = resp.into_inner();
            HealthReport { service: "executive".to_string(), reachable: true, status: body.status, details: body.details.into_iter().collect() }
        }
        Err(_) => unreachable_report("executive"),
    }
}

fn unreachable_report(service: &str) -> HealthReport {
    HealthReport { service: service.to_string(), reachable: false, status: "unreachable".to_string(), details: BTreeMap::new() }
}

pub fn print_report(report: &HealthReport) {
    let icon = if report.reachable { "[OK]" } else { "[--]" };
    println!("{icon} {:<13} {}", report.service, report.status);
    for (k, v) in &report.details {
        println!("      {k} = {v}");
    }
}
