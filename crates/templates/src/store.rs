//! Template store — resolves the stored template for a notification.
//!
//! Resolution order for `(type, channel, locale, tenant)`:
//! 1. tenant-specific template in the requested locale
//! 2. global template in the requested locale
//! 3. tenant-specific template in the base locale (`en`)
//! 4. global template in the base locale
//! 5. built-in default template set
//!
//! The highest version wins within each step.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Channel, NotificationType, Template};

/// Locale every template set must ultimately fall back to.
const BASE_LOCALE: &str = "en";

/// Postgres-backed template store with built-in defaults.
#[derive(Clone)]
pub struct TemplateStore {
    pool: PgPool,
}

impl TemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve the template for a notification, walking the fallback chain.
    /// Never fails with "not found": the built-in defaults cover every
    /// (type, channel) pair.
    pub async fn resolve(
        &self,
        notification_type: NotificationType,
        channel: Channel,
        locale: &str,
        tenant_id: Option<&str>,
    ) -> Result<Template, AppError> {
        let mut candidates: Vec<(Option<&str>, &str)> = Vec::with_capacity(4);
        if let Some(tenant) = tenant_id {
            candidates.push((Some(tenant), locale));
        }
        candidates.push((None, locale));
        if locale != BASE_LOCALE {
            if let Some(tenant) = tenant_id {
                candidates.push((Some(tenant), BASE_LOCALE));
            }
            candidates.push((None, BASE_LOCALE));
        }

        for (tenant, loc) in candidates {
            let found: Option<Template> = sqlx::query_as(
                r#"
                SELECT * FROM templates
                WHERE notification_type = $1
                  AND channel = $2
                  AND locale = $3
                  AND tenant_id IS NOT DISTINCT FROM $4
                ORDER BY version DESC
                LIMIT 1
                "#,
            )
            .bind(notification_type.to_string())
            .bind(channel.to_string())
            .bind(loc)
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(template) = found {
                return Ok(template);
            }
        }

        Ok(default_template(notification_type, channel))
    }

    /// Insert a new template version for a (type, channel, locale, tenant).
    pub async fn upsert(
        &self,
        notification_type: NotificationType,
        channel: Channel,
        locale: &str,
        tenant_id: Option<&str>,
        subject: Option<&str>,
        title: Option<&str>,
        content: &str,
        html_content: Option<&str>,
    ) -> Result<Template, AppError> {
        // version is INT4; the expression must decode as i32
        let next_version: i32 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(version), 0) + 1 FROM templates
            WHERE notification_type = $1
              AND channel = $2
              AND locale = $3
              AND tenant_id IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(notification_type.to_string())
        .bind(channel.to_string())
        .bind(locale)
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        let template: Template = sqlx::query_as(
            r#"
            INSERT INTO templates
                (id, notification_type, channel, locale, tenant_id, version,
                 subject, title, content, html_content, variables, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, '[]', $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification_type.to_string())
        .bind(channel.to_string())
        .bind(locale)
        .bind(tenant_id)
        .bind(next_version)
        .bind(subject)
        .bind(title)
        .bind(content)
        .bind(html_content)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(template)
    }
}

/// Built-in default templates, one per notification type. Subject and HTML
/// body are only meaningful for email; other channels use title + content.
pub fn default_template(notification_type: NotificationType, channel: Channel) -> Template {
    let (subject, title, content) = match notification_type {
        NotificationType::OrderConfirmation => (
            "Order {{orderNumber}} confirmed",
            "Order confirmed",
            "Your order {{orderNumber}} has been confirmed.\
             {{#if total}} Total: {{total}}.{{/if}}",
        ),
        NotificationType::OrderShipped => (
            "Order {{orderNumber}} shipped",
            "Order shipped",
            "Your order {{orderNumber}} is on the way.\
             {{#if trackingNumber}} Tracking: {{trackingNumber}}.{{/if}}",
        ),
        NotificationType::PaymentReceived => (
            "Payment received",
            "Payment received",
            "We received your payment of {{amount}} for order {{orderNumber}}.",
        ),
        NotificationType::PaymentFailed => (
            "Payment failed",
            "Payment failed",
            "Payment for order {{orderNumber}} failed.\
             {{#if reason}} Reason: {{reason}}.{{/if}} Please update your payment method.",
        ),
        NotificationType::ListingApproved => (
            "Listing approved",
            "Listing approved",
            "Your listing \"{{listingTitle}}\" is now live.",
        ),
        NotificationType::ListingRejected => (
            "Listing rejected",
            "Listing rejected",
            "Your listing \"{{listingTitle}}\" was rejected.\
             {{#if reason}} Reason: {{reason}}.{{/if}}",
        ),
        NotificationType::MessageReceived => (
            "New message from {{senderName}}",
            "New message",
            "{{senderName}} sent you a message: {{preview}}",
        ),
        NotificationType::ReviewReceived => (
            "New review on {{listingTitle}}",
            "New review",
            "{{reviewerName}} left a {{rating}}-star review on \"{{listingTitle}}\".",
        ),
        NotificationType::PriceAlert => (
            "Price drop: {{listingTitle}}",
            "Price alert",
            "\"{{listingTitle}}\" dropped to {{newPrice}} (was {{oldPrice}}).",
        ),
        NotificationType::SystemAnnouncement => (
            "{{announcementTitle}}",
            "{{announcementTitle}}",
            "{{announcementBody}}",
        ),
    };

    Template {
        id: Uuid::new_v4(),
        notification_type,
        channel,
        locale: BASE_LOCALE.to_string(),
        tenant_id: None,
        version: 0,
        subject: matches!(channel, Channel::Email).then(|| subject.to_string()),
        title: Some(title.to_string()),
        content: content.to_string(),
        html_content: None,
        variables: serde_json::json!([]),
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer;
    use serde_json::json;

    #[test]
    fn test_default_template_covers_every_type() {
        use NotificationType::*;
        for nt in [
            OrderConfirmation,
            OrderShipped,
            PaymentReceived,
            PaymentFailed,
            ListingApproved,
            ListingRejected,
            MessageReceived,
            ReviewReceived,
            PriceAlert,
            SystemAnnouncement,
        ] {
            let t = default_template(nt, Channel::InApp);
            assert!(!t.content.is_empty());
            assert!(t.title.is_some());
        }
    }

    #[test]
    fn test_default_subject_only_for_email() {
        let email = default_template(NotificationType::OrderShipped, Channel::Email);
        assert!(email.subject.is_some());
        let push = default_template(NotificationType::OrderShipped, Channel::Push);
        assert!(push.subject.is_none());
    }

    #[test]
    fn test_default_order_confirmation_renders_clean() {
        let t = default_template(NotificationType::OrderConfirmation, Channel::Email);
        let rendered = renderer::render(&t, &json!({"orderNumber": "ORD-1", "total": "19.99"}));
        assert!(rendered.content.contains("ORD-1"));
        assert!(rendered.content.contains("19.99"));
        assert!(!rendered.content.contains("{{"));
    }
}
