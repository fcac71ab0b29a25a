use redis::Client;
use redis::aio::ConnectionManager;

/// Create a Redis client. Consumers that issue blocking commands (the
/// queue workers' `BRPOP`) open their own connection from it so they never
/// stall the shared manager.
pub fn create_client(redis_url: &str) -> anyhow::Result<Client> {
    Ok(Client::open(redis_url)?)
}

/// Create the shared Redis connection manager for non-blocking traffic:
/// idempotency claims, dedup hashes, rate-limit counters and queue pushes.
///
/// The manager transparently reconnects. Clones multiplex one connection,
/// so blocking commands must not run through it.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = create_client(redis_url)?;
    let manager = ConnectionManager::new(client).await?;

    tracing::info!("Connected to Redis");
    Ok(manager)
}
