//! Webhook subscription store.
//!
//! Subscriptions are created and updated by their owning user; delivery
//! attempts reference them but never own them. Health counters are updated
//! after every attempt for observability and never auto-disable a
//! subscription.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{BackoffKind, WebhookSubscription};

/// Parameters for registering a new subscription.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateSubscriptionParams {
    pub url: String,
    pub events: Vec<String>,
    pub secret: String,
    pub max_retries: Option<i32>,
    pub retry_backoff: Option<BackoffKind>,
    pub retry_multiplier: Option<f64>,
    pub max_retry_delay_secs: Option<i64>,
}

#[derive(Clone)]
pub struct SubscriptionStore {
    pool: PgPool,
}

impl SubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: &str,
        params: &CreateSubscriptionParams,
    ) -> Result<WebhookSubscription, AppError> {
        if !params.url.starts_with("http://") && !params.url.starts_with("https://") {
            return Err(AppError::Validation(format!(
                "Invalid webhook url '{}'",
                params.url
            )));
        }
        if params.events.is_empty() {
            return Err(AppError::Validation(
                "Subscription must select at least one event".to_string(),
            ));
        }

        let subscription: WebhookSubscription = sqlx::query_as(
            r#"
            INSERT INTO webhook_subscriptions
                (id, user_id, url, events, secret, is_active, max_retries,
                 retry_backoff, retry_multiplier, max_retry_delay_secs,
                 consecutive_failures, created_at)
            VALUES ($1, $2, $3, $4, $5, true, $6, $7, $8, $9, 0, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&params.url)
        .bind(serde_json::json!(params.events))
        .bind(&params.secret)
        .bind(params.max_retries.unwrap_or(3))
        .bind(match params.retry_backoff.unwrap_or(BackoffKind::Exponential) {
            BackoffKind::Linear => "linear",
            BackoffKind::Exponential => "exponential",
        })
        .bind(params.retry_multiplier.unwrap_or(2.0))
        .bind(params.max_retry_delay_secs.unwrap_or(3600))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            user_id,
            url = %subscription.url,
            "Webhook subscription created"
        );
        Ok(subscription)
    }

    pub async fn get(&self, id: Uuid) -> Result<WebhookSubscription, AppError> {
        sqlx::query_as("SELECT * FROM webhook_subscriptions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("webhook subscription {id}")))
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<WebhookSubscription>, AppError> {
        let subs = sqlx::query_as(
            "SELECT * FROM webhook_subscriptions WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    /// All active subscriptions whose event list contains `event_type`
    /// (or the `*` wildcard).
    pub async fn active_for_event(
        &self,
        event_type: &str,
    ) -> Result<Vec<WebhookSubscription>, AppError> {
        let subs: Vec<WebhookSubscription> = sqlx::query_as(
            r#"
            SELECT * FROM webhook_subscriptions
            WHERE is_active = true
              AND (events @> to_jsonb($1::text) OR events @> '"*"'::jsonb)
            "#,
        )
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<(), AppError> {
        sqlx::query("UPDATE webhook_subscriptions SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record the outcome of one delivery attempt on the subscription's
    /// health counters.
    pub async fn record_outcome(&self, id: Uuid, success: bool) -> Result<(), AppError> {
        if success {
            sqlx::query(
                r#"
                UPDATE webhook_subscriptions
                SET consecutive_failures = 0, last_success_at = $2
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE webhook_subscriptions
                SET consecutive_failures = consecutive_failures + 1, last_failure_at = $2
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}
