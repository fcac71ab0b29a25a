use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Idempotency key TTL in seconds (default: 3600)
    pub idempotency_ttl_secs: u64,

    /// Content dedup window in seconds (default: 300)
    pub dedup_window_secs: u64,

    /// Concurrent workers on the single-notification queue (default: 8)
    pub single_concurrency: usize,

    /// Concurrent workers on the bulk queue (default: 2). Kept low because
    /// each bulk job fans out internally.
    pub bulk_concurrency: usize,

    /// Recipients per bulk sub-batch (default: 50)
    pub bulk_batch_size: usize,

    /// Stagger between bulk sub-batches in milliseconds (default: 1000)
    pub bulk_batch_stagger_ms: u64,

    /// Interval of the scheduled-notification scanner in seconds (default: 30)
    pub scheduled_scan_interval_secs: u64,

    /// Interval of the failed-notification retry scanner in seconds (default: 60)
    pub retry_scan_interval_secs: u64,

    /// Interval of the webhook retry scanner in seconds (default: 15)
    pub webhook_scan_interval_secs: u64,

    /// Per-call deadline for provider and webhook dispatch in seconds (default: 10)
    pub provider_timeout_secs: u64,

    /// Email provider API key
    pub email_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// SMS provider API key
    pub sms_api_key: Option<String>,

    /// SMS sender number
    pub sms_from: Option<String>,

    /// Push provider API key
    pub push_api_key: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 20)?,
            idempotency_ttl_secs: parse_var("IDEMPOTENCY_TTL_SECS", 3600)?,
            dedup_window_secs: parse_var("DEDUP_WINDOW_SECS", 300)?,
            single_concurrency: parse_var("SINGLE_CONCURRENCY", 8)?,
            bulk_concurrency: parse_var("BULK_CONCURRENCY", 2)?,
            bulk_batch_size: parse_var("BULK_BATCH_SIZE", 50)?,
            bulk_batch_stagger_ms: parse_var("BULK_BATCH_STAGGER_MS", 1000)?,
            scheduled_scan_interval_secs: parse_var("SCHEDULED_SCAN_INTERVAL_SECS", 30)?,
            retry_scan_interval_secs: parse_var("RETRY_SCAN_INTERVAL_SECS", 60)?,
            webhook_scan_interval_secs: parse_var("WEBHOOK_SCAN_INTERVAL_SECS", 15)?,
            provider_timeout_secs: parse_var("PROVIDER_TIMEOUT_SECS", 10)?,
            email_api_key: std::env::var("EMAIL_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            sms_api_key: std::env::var("SMS_API_KEY").ok(),
            sms_from: std::env::var("SMS_FROM").ok(),
            push_api_key: std::env::var("PUSH_API_KEY").ok(),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{name} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}
