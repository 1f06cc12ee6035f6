//! `psql`, `migrate`, and `clean`: direct database operations, mirroring
//! the source tooling's management script rather than going through a
//! running service.

use std::process::Command;

use anyhow::{bail, Context, Result};

use gladys_memory::config::DatabaseConfig;
use gladys_memory::postgres_store::PostgresStore;

use crate::config::CliConfig;

pub fn psql(config: &CliConfig) -> Result<i32> {
    let status = Command::new("psql")
        .args(["-h", &config.db_host, "-p", &config.db_port.to_string(), "-U", &config.db_user, "-d", &config.db_name])
        .status()
        .context("spawning psql")?;
    Ok(status.code().unwrap_or(1))
}

pub async fn migrate(config: &CliConfig) -> Result<()> {
    let db_config = DatabaseConfig { url: config.database_url.clone(), ..Default::default() };
    let store = PostgresStore::connect(&db_config).await.context("connecting to database")?;
    store.migrate().await.context("running migrations")?;
    println!("migrations applied");
    Ok(())
}

pub async fn clean(config: &CliConfig, table: &str) -> Result<()> {
    let statement = match table {
        "heuristics" => "TRUNCATE heuristics CASCADE",
        "events" => "TRUNCATE episodic_events CASCADE",
        "all" => "TRUNCATE heuristics, episodic_events CASCADE",
        other => bail!("unknown table: {other}"),
    };
    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(1).connect(&config.database_url).await.context("connecting to database")?;
    sqlx::query(statement).execute(&pool).await.context("running truncate")?;
    println!("cleaned: {table}");
    Ok(())
}
