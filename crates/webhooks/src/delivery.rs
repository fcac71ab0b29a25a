//! Webhook delivery engine.
//!
//! `fan_out` creates one pending `webhook_deliveries` row per matching
//! subscription; `run_due` dispatches rows whose retry time has elapsed.
//! Retries of the same delivery are strictly sequential — the next attempt
//! is only scheduled after the previous one's outcome is recorded — while
//! different subscriptions may be reordered freely.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{
    BackoffKind, WebhookDelivery, WebhookDeliveryStatus, WebhookSubscription,
};

use crate::signer;
use crate::subscriptions::SubscriptionStore;

/// Base retry delay in seconds, scaled by the subscription's backoff curve.
const BASE_RETRY_DELAY_SECS: i64 = 30;

pub struct WebhookDeliveryEngine {
    pool: PgPool,
    subscriptions: SubscriptionStore,
    client: Client,
}

impl WebhookDeliveryEngine {
    pub fn new(pool: PgPool, client: Client) -> Self {
        let subscriptions = SubscriptionStore::new(pool.clone());
        Self {
            pool,
            subscriptions,
            client,
        }
    }

    pub fn subscriptions(&self) -> &SubscriptionStore {
        &self.subscriptions
    }

    /// Fan an event out to every active matching subscription. Each match
    /// becomes a pending delivery row due immediately; the dispatch itself
    /// happens in `run_due`, so shutdown never strands untracked work.
    pub async fn fan_out(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<u32, AppError> {
        let subs = self.subscriptions.active_for_event(event_type).await?;
        if subs.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut created = 0u32;
        for sub in &subs {
            sqlx::query(
                r#"
                INSERT INTO webhook_deliveries
                    (id, subscription_id, event_type, payload, status, attempts,
                     next_retry_at, created_at, updated_at)
                VALUES ($1, $2, $3, $4, 'pending', 0, $5, $6, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(sub.id)
            .bind(event_type)
            .bind(payload)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
            created += 1;
        }

        tracing::info!(event_type, deliveries = created, "Webhook fan-out");
        Ok(created)
    }

    /// Dispatch up to `limit` deliveries whose `next_retry_at` has elapsed.
    /// Returns the number attempted.
    pub async fn run_due(&self, limit: i64) -> Result<u32, AppError> {
        let due: Vec<WebhookDelivery> = sqlx::query_as(
            r#"
            SELECT * FROM webhook_deliveries
            WHERE status = 'pending' AND next_retry_at <= $1
            ORDER BY next_retry_at
            LIMIT $2
            "#,
        )
        .bind(Utc::now())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut attempted = 0u32;
        for delivery in due {
            let sub = match self.subscriptions.get(delivery.subscription_id).await {
                Ok(sub) => sub,
                Err(e) => {
                    tracing::warn!(
                        delivery_id = %delivery.id,
                        error = %e,
                        "Skipping delivery with missing subscription"
                    );
                    continue;
                }
            };
            self.attempt(&delivery, &sub).await?;
            attempted += 1;
        }
        Ok(attempted)
    }

    /// Execute one attempt and record its outcome: success, a scheduled
    /// retry, or terminal failure once the retry budget is exhausted.
    pub async fn attempt(
        &self,
        delivery: &WebhookDelivery,
        sub: &WebhookSubscription,
    ) -> Result<WebhookDeliveryStatus, AppError> {
        let attempt_no = delivery.attempts + 1;
        let outcome = self.dispatch(&sub.url, &sub.secret, delivery).await;

        let (status, response_status, error_detail) = match outcome {
            Ok(code) if (200..300).contains(&code) => {
                (WebhookDeliveryStatus::Success, Some(code), None)
            }
            Ok(code) => (
                WebhookDeliveryStatus::Pending,
                Some(code),
                Some(format!("endpoint returned {code}")),
            ),
            Err(e) => (WebhookDeliveryStatus::Pending, None, Some(e)),
        };

        // Non-2xx or transport error: retry while budget remains, else dead
        // letter as Failed.
        let (status, next_retry_at) = if status == WebhookDeliveryStatus::Success {
            (status, None)
        } else if attempt_no < sub.max_retries {
            let delay = retry_delay(
                sub.retry_backoff,
                BASE_RETRY_DELAY_SECS,
                sub.retry_multiplier,
                attempt_no,
                sub.max_retry_delay_secs,
            );
            (
                WebhookDeliveryStatus::Pending,
                Some(Utc::now() + chrono::Duration::seconds(delay)),
            )
        } else {
            (WebhookDeliveryStatus::Failed, None)
        };

        sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = $2, attempts = $3, next_retry_at = $4,
                response_status = $5, error_detail = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(delivery.id)
        .bind(status.to_string())
        .bind(attempt_no)
        .bind(next_retry_at)
        .bind(response_status)
        .bind(&error_detail)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.subscriptions
            .record_outcome(sub.id, status == WebhookDeliveryStatus::Success)
            .await?;

        match status {
            WebhookDeliveryStatus::Success => {
                tracing::info!(
                    delivery_id = %delivery.id,
                    subscription_id = %sub.id,
                    attempt = attempt_no,
                    "Webhook delivered"
                );
            }
            WebhookDeliveryStatus::Pending => {
                tracing::warn!(
                    delivery_id = %delivery.id,
                    attempt = attempt_no,
                    next_retry_at = ?next_retry_at,
                    error = error_detail.as_deref().unwrap_or(""),
                    "Webhook attempt failed, retry scheduled"
                );
            }
            WebhookDeliveryStatus::Failed => {
                tracing::error!(
                    delivery_id = %delivery.id,
                    subscription_id = %sub.id,
                    attempts = attempt_no,
                    "Webhook delivery dead-lettered after exhausting retries"
                );
            }
        }

        Ok(status)
    }

    /// Send one signed POST. Returns the HTTP status code, or a transport
    /// error description.
    async fn dispatch(
        &self,
        url: &str,
        secret: &str,
        delivery: &WebhookDelivery,
    ) -> Result<i32, String> {
        let body = serde_json::json!({
            "id": delivery.id,
            "event": delivery.event_type,
            "attempt": delivery.attempts + 1,
            "created_at": delivery.created_at,
            "data": delivery.payload,
        });
        let body_str = serde_json::to_string(&body).map_err(|e| e.to_string())?;
        let signature = signer::sign(&body_str, secret);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(signer::SIGNATURE_HEADER, signature)
            .body(body_str)
            .send()
            .await
            .map_err(|e| format!("transport error: {e}"))?;

        Ok(response.status().as_u16() as i32)
    }

    /// Send a one-off signed test event to a subscription, bypassing the
    /// delivery table. Used by the `test_webhook` API.
    pub async fn send_test(&self, subscription_id: Uuid) -> Result<bool, AppError> {
        let sub = self.subscriptions.get(subscription_id).await?;
        let delivery = WebhookDelivery {
            id: Uuid::new_v4(),
            subscription_id: sub.id,
            event_type: "webhook.test".to_string(),
            payload: serde_json::json!({ "test": true }),
            status: WebhookDeliveryStatus::Pending,
            attempts: 0,
            next_retry_at: None,
            response_status: None,
            error_detail: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        match self.dispatch(&sub.url, &sub.secret, &delivery).await {
            Ok(code) => Ok((200..300).contains(&code)),
            Err(_) => Ok(false),
        }
    }

    /// Spawn-friendly scanner loop dispatching due deliveries until the
    /// shutdown signal flips.
    pub async fn run_scanner(
        &self,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        tracing::info!(interval_secs = interval.as_secs(), "Webhook retry scanner started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_due(50).await {
                        Ok(n) if n > 0 => {
                            tracing::debug!(dispatched = n, "Webhook scanner pass");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Webhook scanner pass failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Webhook retry scanner stopping");
                        return;
                    }
                }
            }
        }
    }
}

/// Delay in seconds before the retry following attempt `attempts`
/// (1-based), capped at `max_delay_secs`.
///
/// Linear: `base * attempts`. Exponential: `base * multiplier^(attempts-1)`.
pub fn retry_delay(
    kind: BackoffKind,
    base_secs: i64,
    multiplier: f64,
    attempts: i32,
    max_delay_secs: i64,
) -> i64 {
    let attempts = attempts.max(1);
    let raw = match kind {
        BackoffKind::Linear => base_secs.saturating_mul(attempts as i64),
        BackoffKind::Exponential => {
            let factor = multiplier.max(1.0).powi(attempts - 1);
            (base_secs as f64 * factor).round() as i64
        }
    };
    raw.min(max_delay_secs).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_doubles() {
        // multiplier 2, base 1s: attempts 1..4 → 1, 2, 4, 8
        for (attempts, expected) in [(1, 1), (2, 2), (3, 4), (4, 8)] {
            assert_eq!(
                retry_delay(BackoffKind::Exponential, 1, 2.0, attempts, 3600),
                expected
            );
        }
    }

    #[test]
    fn test_exponential_backoff_capped() {
        assert_eq!(retry_delay(BackoffKind::Exponential, 1, 2.0, 10, 100), 100);
    }

    #[test]
    fn test_linear_backoff() {
        for (attempts, expected) in [(1, 30), (2, 60), (3, 90)] {
            assert_eq!(
                retry_delay(BackoffKind::Linear, 30, 2.0, attempts, 3600),
                expected
            );
        }
    }

    #[test]
    fn test_linear_backoff_capped() {
        assert_eq!(retry_delay(BackoffKind::Linear, 30, 2.0, 1000, 120), 120);
    }

    #[test]
    fn test_zero_attempts_treated_as_first() {
        assert_eq!(retry_delay(BackoffKind::Exponential, 1, 2.0, 0, 3600), 1);
    }
}
