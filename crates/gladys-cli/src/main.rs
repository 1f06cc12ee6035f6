//! `gladys`: management CLI for starting, stopping, and inspecting the
//! three GLADyS services running locally.

mod cache;
mod config;
mod db;
mod health;
mod process;
mod queue;

use clap::{Parser, Subcommand};

use config::CliConfig;

#[derive(Parser)]
#[command(name = "gladys")]
#[command(about = "Manage and inspect local GLADyS services")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start one service, or all of them
    Start {
        #[arg(default_value = "all")]
        service: String,
        /// Don't wait for the port to come up before returning
        #[arg(long)]
        no_wait: bool,
    },
    /// Stop one service, or all of them
    Stop {
        #[arg(default_value = "all")]
        service: String,
    },
    /// Restart one service, or all of them
    Restart {
        #[arg(default_value = "all")]
        service: String,
    },
    /// Show which local services are running
    Status,
    /// Query GetHealth/GetHealthDetails on each service
    Health,
    /// Tail a service's local log file
    Logs {
        service: String,
        /// Keep following the file as it grows
        #[arg(short = 'f', long)]
        follow: bool,
    },
    /// Open a psql shell against the GLADyS database
    Psql,
    /// Run pending database migrations
    Migrate,
    /// Truncate tables: heuristics | events | all
    Clean {
        #[arg(default_value = "all")]
        table: String,
    },
    /// Run the workspace test suite
    Test {
        /// Extra arguments forwarded to `cargo test`
        args: Vec<String>,
    },
    /// Stop all services, clean the database, and start them again
    Reset,
    /// Inspect and manage the Memory service's heuristic cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Inspect the Orchestrator's in-process event queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache hit/miss counters and occupancy
    Stats,
    /// List cached heuristics
    List {
        #[arg(long, default_value_t = 50)]
        limit: i32,
    },
    /// Evict every cached heuristic
    Flush,
    /// Evict a single heuristic by id
    Evict { heuristic_id: String },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Show queue size and lifetime counters
    Stats,
    /// List queued events
    List {
        #[arg(long, default_value_t = 50)]
        limit: i32,
    },
    /// Poll queue stats once a second until interrupted
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _log_guard = gladys_common::setup_logging("gladys-cli");
    let config = CliConfig::from_env();

    let code = match run(cli, &config).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli, config: &CliConfig) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Start { service, no_wait } => {
            let targets = process::resolve_targets(&service)?;
            println!("starting local services...");
            let mut ok = true;
            for svc in targets {
                if !process::start(config, svc, !no_wait)? {
                    ok = false;
                }
            }
            Ok(if ok { 0 } else { 1 })
        }
        Commands::Stop { service } => {
            let targets = process::resolve_targets(&service)?;
            println!("stopping local services...");
            let mut ok = true;
            for svc in targets {
                if !process::stop(config, svc)? {
                    ok = false;
                }
            }
            Ok(if ok { 0 } else { 1 })
        }
        Commands::Restart { service } => {
            let targets = process::resolve_targets(&service)?;
            println!("restarting local services...");
            let mut ok = true;
            for svc in targets {
                if !process::restart(config, svc)? {
                    ok = false;
                }
            }
            Ok(if ok { 0 } else { 1 })
        }
        Commands::Status => {
            println!("{:<15}{:<8}{:<8}{:<10}description", "service", "status", "port", "pid");
            for svc in config::SERVICES {
                let st = process::status(config, svc);
                let icon = if st.running { "up" } else { "down" };
                let pid = st.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
                println!("{:<15}{:<8}{:<8}{:<10}{}", st.name, icon, st.port, pid, st.description);
            }
            Ok(0)
        }
        Commands::Health => {
            let (memory, orchestrator, executive) =
                tokio::join!(health::check_memory(config), health::check_orchestrator(config), health::check_executive(config));
            let reports = [memory, orchestrator, executive];
            for report in &reports {
                health::print_report(report);
            }
            Ok(if reports.iter().all(|r| r.reachable) { 0 } else { 1 })
        }
        Commands::Logs { service, follow } => {
            let path = config.logfile(&service);
            if follow {
                let status = std::process::Command::new("tail").arg("-f").arg(&path).status()?;
                Ok(status.code().unwrap_or(130))
            } else {
                let contents = std::fs::read_to_string(&path).unwrap_or_else(|_| "(no log file yet)".to_string());
                print!("{contents}");
                Ok(0)
            }
        }
        Commands::Psql => db::psql(config),
        Commands::Migrate => {
            db::migrate(config).await?;
            Ok(0)
        }
        Commands::Clean { table } => {
            db::clean(config, &table).await?;
            Ok(0)
        }
        Commands::Test { args } => {
            let status = std::process::Command::new("cargo").arg("test").arg("--workspace").args(&args).status()?;
            Ok(status.code().unwrap_or(1))
        }
        Commands::Reset => {
            println!("resetting GLADyS (local)...");
            for svc in config::SERVICES {
                process::stop(config, svc)?;
            }
            db::clean(config, "all").await?;
            for svc in config::SERVICES {
                process::start(config, svc, true)?;
            }
            Ok(0)
        }
        Commands::Cache { command } => match command {
            CacheCommands::Stats => {
                cache::stats(config).await?;
                Ok(0)
            }
            CacheCommands::List { limit } => {
                cache::list(config, limit).await?;
                Ok(0)
            }
            CacheCommands::Flush => {
                cache::flush(config).await?;
                Ok(0)
            }
            CacheCommands::Evict { heuristic_id } => {
                cache::evict(config, &heuristic_id).await?;
                Ok(0)
            }
        },
        Commands::Queue { command } => match command {
            QueueCommands::Stats => {
                queue::stats(config).await?;
                Ok(0)
            }
            QueueCommands::List { limit } => {
                queue::list(config, limit).await?;
                Ok(0)
            }
            QueueCommands::Watch => Ok(if queue::watch(config).await? { 130 } else { 0 }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_start_all_by_default() {
        let cli = Cli::parse_from(["gladys", "start"]);
        match cli.command {
            Commands::Start { service, no_wait } => {
                assert_eq!(service, "all");
                assert!(!no_wait);
            }
            _ => panic!("expected Start"),
        }
    }

    #[test]
    fn test_parses_cache_evict() {
        let cli = Cli::parse_from(["gladys", "cache", "evict", "11111111-1111-1111-1111-111111111111"]);
        match cli.command {
            Commands::Cache { command: CacheCommands::Evict { heuristic_id } } => {
                assert_eq!(heuristic_id, "11111111-1111-1111-1111-111111111111");
            }
            _ => panic!("expected Cache Evict"),
        }
    }

    #[test]
    fn test_parses_queue_list_with_limit() {
        let cli = Cli::parse_from(["gladys", "queue", "list", "--limit", "10"]);
        match cli.command {
            Commands::Queue { command: QueueCommands::List { limit } } => assert_eq!(limit, 10),
            _ => panic!("expected Queue List"),
        }
    }
}
