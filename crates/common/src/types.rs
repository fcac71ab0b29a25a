use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery channels supported by the engine.
///
/// This is a closed set: adding a channel means adding a variant here and a
/// sender in `courier-channels`, checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Push,
    InApp,
    Webhook,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
            Channel::Push => write!(f, "push"),
            Channel::InApp => write!(f, "in_app"),
            Channel::Webhook => write!(f, "webhook"),
        }
    }
}

/// Notification priority. `Urgent` bypasses quiet-hours suppression.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

/// Marketplace notification types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
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
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationType::OrderConfirmation => write!(f, "order_confirmation"),
            NotificationType::OrderShipped => write!(f, "order_shipped"),
            NotificationType::PaymentReceived => write!(f, "payment_received"),
            NotificationType::PaymentFailed => write!(f, "payment_failed"),
            NotificationType::ListingApproved => write!(f, "listing_approved"),
            NotificationType::ListingRejected => write!(f, "listing_rejected"),
            NotificationType::MessageReceived => write!(f, "message_received"),
            NotificationType::ReviewReceived => write!(f, "review_received"),
            NotificationType::PriceAlert => write!(f, "price_alert"),
            NotificationType::SystemAnnouncement => write!(f, "system_announcement"),
        }
    }
}

/// Lifecycle of a notification record.
///
/// `Pending → (Queued | Scheduled) → Processing → {Sent, Failed, Cancelled, Expired}`.
/// Terminal states are only re-entered by the retry scanner, which re-queues
/// `Failed` records within their retry window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Queued,
    Scheduled,
    Processing,
    Sent,
    Failed,
    Cancelled,
    Expired,
}

impl NotificationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NotificationStatus::Sent
                | NotificationStatus::Failed
                | NotificationStatus::Cancelled
                | NotificationStatus::Expired
        )
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Pending => write!(f, "pending"),
            NotificationStatus::Queued => write!(f, "queued"),
            NotificationStatus::Scheduled => write!(f, "scheduled"),
            NotificationStatus::Processing => write!(f, "processing"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Failed => write!(f, "failed"),
            NotificationStatus::Cancelled => write!(f, "cancelled"),
            NotificationStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Scope of a rate-limit rule. Lookup falls back from the requested scope
/// to `Global`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RateLimitScope {
    Global,
    Tenant,
    User,
}

impl std::fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitScope::Global => write!(f, "global"),
            RateLimitScope::Tenant => write!(f, "tenant"),
            RateLimitScope::User => write!(f, "user"),
        }
    }
}

/// Backoff curve for webhook retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Linear,
    Exponential,
}

/// Webhook delivery attempt status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WebhookDeliveryStatus {
    Pending,
    Success,
    Failed,
}

impl std::fmt::Display for WebhookDeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookDeliveryStatus::Pending => write!(f, "pending"),
            WebhookDeliveryStatus::Success => write!(f, "success"),
            WebhookDeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Per-user delivery frequency preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Immediate,
    Hourly,
    Daily,
}

/// A delivery target. One recipient may satisfy multiple channel needs
/// (a `UserId` serves in-app directly and resolves preferences for the rest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recipient {
    UserId { user_id: String },
    Email { email: String },
    Phone { phone: String },
    DeviceToken { device_token: String },
    WebhookUrl { webhook_url: String },
}

impl Recipient {
    /// The user id this recipient maps to, if any. Preference resolution and
    /// the in-app inbox are keyed by user id.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Recipient::UserId { user_id } => Some(user_id),
            _ => None,
        }
    }
}

/// Caller-supplied request context carried through the pipeline for tracing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
    pub source: Option<String>,
}

/// An incoming notification request. Immutable once accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub notification_type: NotificationType,
    pub recipients: Vec<Recipient>,
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub priority: Priority,
    pub category: Option<String>,
    #[serde(default)]
    pub template_variables: serde_json::Value,
    #[serde(default)]
    pub context: RequestContext,
    /// BCP 47 tag for template selection, defaulting to `en`.
    pub locale: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
    /// When set, a store outage fails the request instead of failing open
    /// past the idempotency check.
    #[serde(default)]
    pub strict_idempotency: bool,
}

/// Persisted projection of an accepted request. Status is owned exclusively
/// by the orchestrator; everything else is immutable after intake.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub category: Option<String>,
    pub recipients: serde_json::Value,
    pub channels: serde_json::Value,
    pub template_variables: serde_json::Value,
    pub locale: Option<String>,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
    pub source: Option<String>,
    pub status: NotificationStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    /// Typed view of the `recipients` JSON column.
    pub fn recipients(&self) -> Vec<Recipient> {
        serde_json::from_value(self.recipients.clone()).unwrap_or_default()
    }

    /// Typed view of the `channels` JSON column.
    pub fn channel_list(&self) -> Vec<Channel> {
        serde_json::from_value(self.channels.clone()).unwrap_or_default()
    }
}

/// Append-only outcome of one delivery attempt for one
/// (notification, channel, recipient) triple. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryResult {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub channel: Channel,
    pub recipient: serde_json::Value,
    pub success: bool,
    /// Whether a failed attempt may be retried. Permanent recipient and
    /// configuration faults are terminal for their (channel, recipient)
    /// pair; successes carry `false` vacuously.
    pub retryable: bool,
    pub message_id: Option<String>,
    pub error_detail: Option<String>,
    pub attempts: i32,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A stored message template, keyed by (type, channel, locale) with
/// tenant-specific → global and locale → base-locale fallback.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Template {
    pub id: Uuid,
    pub notification_type: NotificationType,
    pub channel: Channel,
    pub locale: String,
    pub tenant_id: Option<String>,
    pub version: i32,
    pub subject: Option<String>,
    pub title: Option<String>,
    pub content: String,
    pub html_content: Option<String>,
    pub variables: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Rendered output of a template, ready for a channel sender.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderedContent {
    pub subject: Option<String>,
    pub title: Option<String>,
    pub content: String,
    pub html_content: Option<String>,
}

/// A user's notification preference for one type, or `"all"` as a fallback
/// row covering every type.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Preference {
    pub id: Uuid,
    pub user_id: String,
    pub notification_type: String,
    pub channels: serde_json::Value,
    pub is_enabled: bool,
    pub quiet_start: Option<NaiveTime>,
    pub quiet_end: Option<NaiveTime>,
    pub quiet_tz: Option<String>,
    pub frequency: Frequency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Preference {
    /// Typed view of the `channels` JSON column.
    pub fn channel_list(&self) -> Vec<Channel> {
        serde_json::from_value(self.channels.clone()).unwrap_or_default()
    }
}

/// A rate-limit rule for one (channel, scope) pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RateLimitRule {
    pub id: Uuid,
    pub channel: Channel,
    pub scope: RateLimitScope,
    pub max_per_minute: i64,
    pub max_per_hour: i64,
    pub max_per_day: i64,
    pub burst_limit: i64,
}

/// An outbound webhook subscription registered by a user. Referenced, never
/// owned, by delivery attempts.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub user_id: String,
    pub url: String,
    pub events: serde_json::Value,
    pub secret: String,
    pub is_active: bool,
    pub max_retries: i32,
    pub retry_backoff: BackoffKind,
    pub retry_multiplier: f64,
    pub max_retry_delay_secs: i64,
    pub consecutive_failures: i32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WebhookSubscription {
    /// Typed view of the `events` JSON column.
    pub fn event_list(&self) -> Vec<String> {
        serde_json::from_value(self.events.clone()).unwrap_or_default()
    }

    /// Whether this subscription wants the given event type.
    pub fn matches_event(&self, event_type: &str) -> bool {
        self.event_list().iter().any(|e| e == event_type || e == "*")
    }
}

/// One webhook delivery, mutated in place across retries until terminal.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: WebhookDeliveryStatus,
    pub attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub response_status: Option<i32>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An in-app inbox message produced by the InApp channel.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InAppMessage {
    pub id: Uuid,
    pub user_id: String,
    pub notification_id: Option<Uuid>,
    pub title: Option<String>,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_tagged_serde() {
        let r = Recipient::Email {
            email: "buyer@example.com".to_string(),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["kind"], "email");
        let back: Recipient = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_recipient_user_id() {
        let r = Recipient::UserId {
            user_id: "u1".to_string(),
        };
        assert_eq!(r.user_id(), Some("u1"));
        let r = Recipient::Phone {
            phone: "+15550001".to_string(),
        };
        assert_eq!(r.user_id(), None);
    }

    #[test]
    fn test_status_terminal() {
        assert!(NotificationStatus::Sent.is_terminal());
        assert!(NotificationStatus::Cancelled.is_terminal());
        assert!(!NotificationStatus::Queued.is_terminal());
        assert!(!NotificationStatus::Processing.is_terminal());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_subscription_event_match() {
        let sub = WebhookSubscription {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            url: "https://example.com/hook".to_string(),
            events: serde_json::json!(["order.created", "order.shipped"]),
            secret: "s".to_string(),
            is_active: true,
            max_retries: 3,
            retry_backoff: BackoffKind::Exponential,
            retry_multiplier: 2.0,
            max_retry_delay_secs: 3600,
            consecutive_failures: 0,
            last_success_at: None,
            last_failure_at: None,
            created_at: Utc::now(),
        };
        assert!(sub.matches_event("order.created"));
        assert!(!sub.matches_event("payment.failed"));
    }
}
