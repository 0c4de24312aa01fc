use super::parse_env;
use anyhow::Context;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::env;
use std::time::Duration;

pub async fn get_database() -> anyhow::Result<DatabaseConnection> {
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let max_connections: u32 = parse_env("DB_MAX_CONNECTIONS", 10);
    let min_connections: u32 = parse_env("DB_MIN_CONNECTIONS", 2);
    let connect_timeout: u64 = parse_env("DB_CONNECT_TIMEOUT_SECS", 5);
    // Bounded wait for a pooled connection so requests fail instead of hanging.
    let acquire_timeout: u64 = parse_env("DB_ACQUIRE_TIMEOUT_SECS", 10);

    let mut opt = ConnectOptions::new(database_url);
    opt.max_connections(max_connections)
        .min_connections(min_connections)
        .connect_timeout(Duration::from_secs(connect_timeout))
        .acquire_timeout(Duration::from_secs(acquire_timeout))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(true);

    Database::connect(opt)
        .await
        .context("Failed to connect to database")
}
