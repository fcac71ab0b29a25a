use thiserror::Error;

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error originates from the shared Redis store.
    ///
    /// Callers in the guard/limiter path use this to decide fail-open
    /// behavior: delivery availability is prioritized over perfect
    /// dedup or rate-limit protection when the store is down.
    pub fn is_store_error(&self) -> bool {
        matches!(self, AppError::Redis(_))
    }
}
