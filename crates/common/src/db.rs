use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect the shared PostgreSQL pool, sized for the delivery workers plus
/// the scanners (`DB_MAX_CONNECTIONS`, default 20).
///
/// The short acquire timeout surfaces an exhausted pool as an error instead
/// of stalling a fan-out mid-flight.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}
