use super::parse_env;
use anyhow::Context;
use redis::aio::ConnectionManager;
use tokio::time::{timeout, Duration};

/// Connect the Redis session backend. Fails fast instead of retrying so a
/// misconfigured `SESSION_STORE=redis` is caught at startup.
pub async fn get_redis() -> anyhow::Result<ConnectionManager> {
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let connect_timeout: u64 = parse_env("REDIS_CONNECT_TIMEOUT_SECS", 5);

    let client = redis::Client::open(redis_url).context("Invalid REDIS_URL")?;
    let manager = timeout(
        Duration::from_secs(connect_timeout),
        ConnectionManager::new(client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after {connect_timeout} seconds"))??;

    Ok(manager)
}
