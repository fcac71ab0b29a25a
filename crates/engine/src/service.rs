//! The facade the rest of the marketplace talks to.
//!
//! Everything here is a thin composition over the orchestrator, the in-app
//! inbox, the webhook engine and the metrics store; no business rules of
//! its own beyond mapping domain events to notification requests.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{
    InAppMessage, NotificationRecord, NotificationRequest, NotificationType, Priority, Recipient,
    RequestContext, WebhookSubscription,
};
use courier_webhooks::{signer, CreateSubscriptionParams, WebhookDeliveryEngine};

use crate::metrics::{ChannelPerformance, DeliveryMetrics, MetricsFilter, MetricsStore};
use crate::orchestrator::Orchestrator;
use crate::preferences::default_channels;

pub struct NotificationService {
    pool: PgPool,
    orchestrator: Arc<Orchestrator>,
    webhooks: Arc<WebhookDeliveryEngine>,
    metrics: MetricsStore,
}

impl NotificationService {
    pub fn new(
        pool: PgPool,
        orchestrator: Arc<Orchestrator>,
        webhooks: Arc<WebhookDeliveryEngine>,
    ) -> Self {
        let metrics = MetricsStore::new(pool.clone());
        Self {
            pool,
            orchestrator,
            webhooks,
            metrics,
        }
    }

    /// Accept a single notification. A replayed idempotency key returns the
    /// id of the original notification.
    pub async fn send_notification(&self, request: &NotificationRequest) -> Result<Uuid, AppError> {
        self.orchestrator.accept(request).await
    }

    /// Accept a bulk notification; returns the batch id.
    pub async fn send_bulk(&self, request: &NotificationRequest) -> Result<Uuid, AppError> {
        self.orchestrator.accept_bulk(request).await
    }

    pub async fn cancel_notification(&self, notification_id: Uuid) -> Result<(), AppError> {
        self.orchestrator.cancel(notification_id).await
    }

    pub async fn notification(&self, notification_id: Uuid) -> Result<NotificationRecord, AppError> {
        sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
            .bind(notification_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("notification {notification_id}")))
    }

    /// A user's in-app inbox, newest first.
    pub async fn user_notifications(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InAppMessage>, AppError> {
        let messages = sqlx::query_as(
            r#"
            SELECT * FROM inapp_messages
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// Mark one inbox message read. Scoped to the owning user so one user
    /// cannot mark another's messages.
    pub async fn mark_as_read(&self, user_id: &str, message_id: Uuid) -> Result<(), AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE inapp_messages
            SET is_read = true, read_at = $3
            WHERE id = $1 AND user_id = $2 AND is_read = false
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "unread message {message_id} for user {user_id}"
            )));
        }
        Ok(())
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM inapp_messages WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn create_webhook_subscription(
        &self,
        user_id: &str,
        params: &CreateSubscriptionParams,
    ) -> Result<WebhookSubscription, AppError> {
        self.webhooks.subscriptions().create(user_id, params).await
    }

    /// Fire a one-off test event at a subscription; true on a 2xx response.
    pub async fn test_webhook(&self, subscription_id: Uuid) -> Result<bool, AppError> {
        self.webhooks.send_test(subscription_id).await
    }

    /// Verify a signature header a subscriber received. Exposed so
    /// subscribers built on this crate can validate inbound deliveries.
    pub fn verify_signature(payload: &str, secret: &str, signature_header: &str) -> bool {
        signer::verify(payload, secret, signature_header)
    }

    /// Domain-event hook: fan the raw event out to webhook subscribers and,
    /// when the event maps to a notification type, send the notification.
    pub async fn on_event(
        &self,
        event_name: &str,
        payload: &serde_json::Value,
    ) -> Result<Option<Uuid>, AppError> {
        let fanned_out = self.webhooks.fan_out(event_name, payload).await?;
        tracing::debug!(event_name, fanned_out, "Domain event fanned out to webhooks");

        match map_event(event_name, payload) {
            Some(request) => self.send_notification(&request).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn metrics(&self, filter: &MetricsFilter) -> Result<DeliveryMetrics, AppError> {
        self.metrics.delivery_metrics(filter).await
    }

    pub async fn channel_performance(
        &self,
        filter: &MetricsFilter,
    ) -> Result<Vec<ChannelPerformance>, AppError> {
        self.metrics.channel_performance(filter).await
    }
}

/// Map a marketplace domain event to a notification request. Events without
/// a mapping (or without a `user_id` in the payload) only reach webhook
/// subscribers.
pub fn map_event(event_name: &str, payload: &serde_json::Value) -> Option<NotificationRequest> {
    let (notification_type, priority) = match event_name {
        "order.created" => (NotificationType::OrderConfirmation, Priority::Normal),
        "order.shipped" => (NotificationType::OrderShipped, Priority::Normal),
        "payment.received" => (NotificationType::PaymentReceived, Priority::Normal),
        "payment.failed" => (NotificationType::PaymentFailed, Priority::High),
        "listing.approved" => (NotificationType::ListingApproved, Priority::Normal),
        "listing.rejected" => (NotificationType::ListingRejected, Priority::Normal),
        "message.received" => (NotificationType::MessageReceived, Priority::Normal),
        "review.received" => (NotificationType::ReviewReceived, Priority::Low),
        "price.alert" => (NotificationType::PriceAlert, Priority::Normal),
        _ => return None,
    };

    let user_id = payload.get("user_id")?.as_str()?.to_string();
    Some(NotificationRequest {
        notification_type,
        recipients: vec![Recipient::UserId {
            user_id: user_id.clone(),
        }],
        channels: default_channels(notification_type),
        priority,
        category: None,
        template_variables: payload.clone(),
        context: RequestContext {
            tenant_id: payload
                .get("tenant_id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            user_id: Some(user_id),
            correlation_id: payload
                .get("correlation_id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            source: Some(event_name.to_string()),
        },
        locale: payload
            .get("locale")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        scheduled_at: None,
        expires_at: None,
        idempotency_key: payload
            .get("event_id")
            .and_then(|v| v.as_str())
            .map(|id| format!("{event_name}:{id}")),
        strict_idempotency: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::types::Channel;

    #[test]
    fn test_map_known_event() {
        let payload = serde_json::json!({
            "user_id": "u1",
            "event_id": "evt-42",
            "orderNumber": "ORD-1001",
        });
        let request = map_event("order.created", &payload).unwrap();
        assert_eq!(request.notification_type, NotificationType::OrderConfirmation);
        assert_eq!(request.recipients.len(), 1);
        assert!(request.channels.contains(&Channel::InApp));
        assert_eq!(
            request.idempotency_key.as_deref(),
            Some("order.created:evt-42")
        );
        assert_eq!(request.context.source.as_deref(), Some("order.created"));
    }

    #[test]
    fn test_payment_failed_is_high_priority() {
        let payload = serde_json::json!({ "user_id": "u1" });
        let request = map_event("payment.failed", &payload).unwrap();
        assert_eq!(request.priority, Priority::High);
        assert!(request.idempotency_key.is_none());
    }

    #[test]
    fn test_unknown_or_userless_events_skip_notification() {
        assert!(map_event("inventory.low", &serde_json::json!({"user_id": "u1"})).is_none());
        assert!(map_event("order.created", &serde_json::json!({"sku": "X"})).is_none());
    }
}
