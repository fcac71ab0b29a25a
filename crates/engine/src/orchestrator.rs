//! Notification orchestrator.
//!
//! Owns the record state machine end to end: intake (idempotency, dedup,
//! persist, enqueue) and processing (expiry check, per recipient × channel
//! fan-out through preferences, rate limiting, rendering and routing, then
//! aggregation). The status column is mutated here and nowhere else;
//! channel senders and the webhook engine only append result rows.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use uuid::Uuid;

use courier_channels::ChannelRouter;
use courier_common::error::AppError;
use courier_common::types::{
    Channel, DeliveryResult, NotificationRecord, NotificationRequest, NotificationStatus,
    RateLimitScope, Recipient,
};
use courier_guard::{Claim, IdempotencyGuard, RateLimiter};
use courier_templates::TemplateStore;

use crate::preferences::PreferenceResolver;
use crate::scheduler::Dispatcher;

/// Per (channel, recipient) retry budget across processing cycles.
pub const MAX_CHANNEL_ATTEMPTS: i32 = 3;

pub struct Orchestrator {
    pool: PgPool,
    redis: ConnectionManager,
    guard: IdempotencyGuard,
    limiter: RateLimiter,
    router: Arc<ChannelRouter>,
    templates: TemplateStore,
    preferences: PreferenceResolver,
    dispatcher: Dispatcher,
    bulk_batch_size: usize,
    bulk_batch_stagger: Duration,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        guard: IdempotencyGuard,
        limiter: RateLimiter,
        router: Arc<ChannelRouter>,
        templates: TemplateStore,
        preferences: PreferenceResolver,
        dispatcher: Dispatcher,
        bulk_batch_size: usize,
        bulk_batch_stagger: Duration,
    ) -> Self {
        Self {
            pool,
            redis,
            guard,
            limiter,
            router,
            templates,
            preferences,
            dispatcher,
            bulk_batch_size,
            bulk_batch_stagger,
        }
    }

    /// Accept a request: claim idempotency, suppress near-duplicates,
    /// persist the record and queue or schedule it.
    ///
    /// A replayed idempotency key returns the original notification id
    /// instead of erroring.
    pub async fn accept(&self, request: &NotificationRequest) -> Result<Uuid, AppError> {
        if request.recipients.is_empty() {
            return Err(AppError::Validation("request has no recipients".into()));
        }
        if request.channels.is_empty() {
            return Err(AppError::Validation("request has no channels".into()));
        }

        let notification_id = Uuid::new_v4();
        let mut redis = self.redis.clone();

        if let Some(key) = &request.idempotency_key {
            match self.guard.claim(&mut redis, key, notification_id).await {
                Ok(Claim::AlreadyExists(existing)) => return Ok(existing),
                Ok(Claim::Claimed) => {}
                Err(e) if e.is_store_error() && !request.strict_idempotency => {
                    tracing::warn!(
                        error = %e,
                        idempotency_key = key,
                        "Idempotency store unavailable — failing open"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        // Content-based dedup catches near-duplicate sends without a key.
        // Store errors fail open here unconditionally.
        if let Some(user_id) = dedup_user(request) {
            let content = dedup_content(request);
            match self
                .guard
                .is_duplicate_content(&mut redis, user_id, &content)
                .await
            {
                Ok(true) => {
                    tracing::info!(
                        user_id,
                        notification_type = %request.notification_type,
                        "Duplicate content suppressed within dedup window"
                    );
                    self.persist(notification_id, request, NotificationStatus::Cancelled)
                        .await?;
                    return Ok(notification_id);
                }
                Ok(false) => {}
                Err(e) if e.is_store_error() => {
                    tracing::warn!(error = %e, "Dedup store unavailable — failing open");
                }
                Err(e) => return Err(e),
            }
        }

        let scheduled = request
            .scheduled_at
            .is_some_and(|at| at > Utc::now());
        let status = if scheduled {
            NotificationStatus::Scheduled
        } else {
            NotificationStatus::Queued
        };

        if let Err(e) = self.persist(notification_id, request, status).await {
            // Free the key so the caller's retry is not locked out for the
            // whole TTL by a failed persist.
            if let Some(key) = &request.idempotency_key {
                let _ = self.guard.release(&mut redis, key).await;
            }
            return Err(e);
        }

        if !scheduled {
            self.dispatcher.push_single(notification_id).await?;
        }

        tracing::info!(
            notification_id = %notification_id,
            notification_type = %request.notification_type,
            recipients = request.recipients.len(),
            status = %status,
            "Notification accepted"
        );
        Ok(notification_id)
    }

    /// Accept a bulk request onto the bulk queue. The whole batch is one
    /// record; processing fans out in staggered sub-batches.
    pub async fn accept_bulk(&self, request: &NotificationRequest) -> Result<Uuid, AppError> {
        if request.recipients.is_empty() {
            return Err(AppError::Validation("bulk request has no recipients".into()));
        }
        if request.channels.is_empty() {
            return Err(AppError::Validation("bulk request has no channels".into()));
        }

        let batch_id = Uuid::new_v4();
        self.persist(batch_id, request, NotificationStatus::Queued)
            .await?;
        self.dispatcher.push_bulk(batch_id).await?;

        tracing::info!(
            batch_id = %batch_id,
            notification_type = %request.notification_type,
            recipients = request.recipients.len(),
            "Bulk notification accepted"
        );
        Ok(batch_id)
    }

    /// Process one notification to a terminal status.
    pub async fn process(&self, notification_id: Uuid) -> Result<NotificationStatus, AppError> {
        let record = self.load(notification_id).await?;

        // Re-processing a record that already reached a non-retryable
        // terminal state is a no-op (duplicate queue entries, races with
        // the scanners).
        if record.status.is_terminal() && record.status != NotificationStatus::Failed {
            return Ok(record.status);
        }

        // Cooperative cancellation: expiry is checked here, not enforced
        // preemptively on in-flight sends.
        if let Some(expires_at) = record.expires_at
            && expires_at <= Utc::now()
        {
            self.finish(notification_id, NotificationStatus::Cancelled)
                .await?;
            tracing::info!(notification_id = %notification_id, "Notification expired before processing");
            return Ok(NotificationStatus::Cancelled);
        }

        self.mark_processing(notification_id).await?;

        let prior = self.load_results(notification_id).await?;
        let mut new_results = Vec::new();
        for recipient in record.recipients() {
            self.deliver_to_recipient(&record, &recipient, &prior, &mut new_results)
                .await?;
        }

        let status = overall_status(prior.iter().chain(new_results.iter()));
        self.finish(notification_id, status).await?;

        tracing::info!(
            notification_id = %notification_id,
            attempts = new_results.len(),
            succeeded = new_results.iter().filter(|r| r.success).count(),
            status = %status,
            "Notification processed"
        );
        Ok(status)
    }

    /// Process a bulk record: same per-recipient pipeline, but recipients
    /// are split into sub-batches with a stagger between them to smooth
    /// burst load against the rate limits.
    pub async fn process_bulk(&self, notification_id: Uuid) -> Result<NotificationStatus, AppError> {
        let record = self.load(notification_id).await?;
        if record.status.is_terminal() && record.status != NotificationStatus::Failed {
            return Ok(record.status);
        }
        if let Some(expires_at) = record.expires_at
            && expires_at <= Utc::now()
        {
            self.finish(notification_id, NotificationStatus::Cancelled)
                .await?;
            return Ok(NotificationStatus::Cancelled);
        }

        self.mark_processing(notification_id).await?;

        let prior = self.load_results(notification_id).await?;
        let recipients = record.recipients();
        let mut new_results = Vec::new();

        for (batch_no, batch) in recipients.chunks(self.bulk_batch_size.max(1)).enumerate() {
            if batch_no > 0 {
                tokio::time::sleep(self.bulk_batch_stagger).await;
            }
            for recipient in batch {
                self.deliver_to_recipient(&record, recipient, &prior, &mut new_results)
                    .await?;
            }
            tracing::debug!(
                notification_id = %notification_id,
                batch_no,
                batch_len = batch.len(),
                "Bulk sub-batch processed"
            );
        }

        let status = overall_status(prior.iter().chain(new_results.iter()));
        self.finish(notification_id, status).await?;
        Ok(status)
    }

    /// Explicitly cancel a notification that has not reached a terminal
    /// state yet.
    pub async fn cancel(&self, notification_id: Uuid) -> Result<(), AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'cancelled', completed_at = $2
            WHERE id = $1 AND status IN ('pending', 'queued', 'scheduled')
            "#,
        )
        .bind(notification_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::Validation(format!(
                "notification {notification_id} is not cancellable"
            )));
        }
        Ok(())
    }

    /// Fan one recipient out across its allowed channels, appending the
    /// outcomes to `new_results`.
    async fn deliver_to_recipient(
        &self,
        record: &NotificationRecord,
        recipient: &Recipient,
        prior: &[DeliveryResult],
        new_results: &mut Vec<DeliveryResult>,
    ) -> Result<(), AppError> {
        let requested = record.channel_list();

        let allowed = match recipient.user_id() {
            Some(user_id) => {
                let resolved = self
                    .preferences
                    .resolve(user_id, record.notification_type)
                    .await?;
                if resolved.suppressed_by_quiet_hours(record.priority, Utc::now()) {
                    tracing::debug!(
                        notification_id = %record.id,
                        user_id,
                        "Suppressed by quiet hours"
                    );
                    return Ok(());
                }
                resolved.filter(&requested)
            }
            // Raw-address recipients have no user to resolve preferences
            // for; the requested channels stand.
            None => requested,
        };

        for channel in allowed {
            if !variant_matches(channel, recipient) {
                continue;
            }

            let recipient_json = serde_json::to_value(recipient).unwrap_or_default();
            if !pair_should_attempt(prior, channel, &recipient_json) {
                continue;
            }
            let attempts_so_far = prior
                .iter()
                .filter(|r| r.channel == channel && r.recipient == recipient_json)
                .map(|r| r.attempts)
                .max()
                .unwrap_or(0);

            // Rate limiting silently skips the channel for this cycle; it
            // is not an error surfaced to the caller.
            let (scope, scope_key) = rate_scope(record, recipient);
            let mut redis = self.redis.clone();
            if !self.limiter.allow(&mut redis, &scope_key, channel, scope).await {
                tracing::debug!(
                    notification_id = %record.id,
                    channel = %channel,
                    scope_key,
                    "Channel skipped by rate limit"
                );
                continue;
            }

            let template = self
                .templates
                .resolve(
                    record.notification_type,
                    channel,
                    record.locale.as_deref().unwrap_or("en"),
                    record.tenant_id.as_deref(),
                )
                .await?;
            let content = courier_templates::render(&template, &record.template_variables);

            let result = self
                .router
                .deliver(record.id, channel, recipient, &content, attempts_so_far + 1)
                .await;
            self.store_result(&result).await?;
            new_results.push(result);
        }

        Ok(())
    }

    async fn persist(
        &self,
        id: Uuid,
        request: &NotificationRequest,
        status: NotificationStatus,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, notification_type, priority, category, recipients, channels,
                 template_variables, locale, tenant_id, user_id, correlation_id, source,
                 status, scheduled_at, expires_at, idempotency_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(id)
        .bind(request.notification_type.to_string())
        .bind(request.priority.to_string())
        .bind(&request.category)
        .bind(serde_json::json!(request.recipients))
        .bind(serde_json::json!(request.channels))
        .bind(&request.template_variables)
        .bind(&request.locale)
        .bind(&request.context.tenant_id)
        .bind(&request.context.user_id)
        .bind(&request.context.correlation_id)
        .bind(&request.context.source)
        .bind(status.to_string())
        .bind(request.scheduled_at)
        .bind(request.expires_at)
        .bind(&request.idempotency_key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<NotificationRecord, AppError> {
        sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("notification {id}")))
    }

    async fn load_results(&self, id: Uuid) -> Result<Vec<DeliveryResult>, AppError> {
        let results = sqlx::query_as(
            "SELECT * FROM delivery_results WHERE notification_id = $1 ORDER BY created_at",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(results)
    }

    async fn store_result(&self, result: &DeliveryResult) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO delivery_results
                (id, notification_id, channel, recipient, success, retryable,
                 message_id, error_detail, attempts, delivered_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(result.id)
        .bind(result.notification_id)
        .bind(result.channel.to_string())
        .bind(&result.recipient)
        .bind(result.success)
        .bind(result.retryable)
        .bind(&result.message_id)
        .bind(&result.error_detail)
        .bind(result.attempts)
        .bind(result.delivered_at)
        .bind(result.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_processing(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE notifications SET status = 'processing', processed_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish(&self, id: Uuid, status: NotificationStatus) -> Result<(), AppError> {
        sqlx::query("UPDATE notifications SET status = $2, completed_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Partial success counts as success: the contract is "delivered on at
/// least one requested channel". All-failed (or nothing attempted) is
/// `Failed`, which keeps the record eligible for the retry scanner.
pub fn overall_status<'a>(
    mut results: impl Iterator<Item = &'a DeliveryResult>,
) -> NotificationStatus {
    if results.any(|r| r.success) {
        NotificationStatus::Sent
    } else {
        NotificationStatus::Failed
    }
}

/// Whether a (channel, recipient) pair still warrants a delivery attempt,
/// given its prior results.
///
/// A pair is done once it succeeded, once any attempt failed permanently
/// (invalid address, unconfigured channel), or once its retry budget is
/// spent. A pair with no results at all — rate-limited or suppressed on
/// every prior cycle — still has its full budget.
pub fn pair_should_attempt(
    prior: &[DeliveryResult],
    channel: Channel,
    recipient_json: &serde_json::Value,
) -> bool {
    let mut max_attempts = 0;
    for result in prior
        .iter()
        .filter(|r| r.channel == channel && r.recipient == *recipient_json)
    {
        if result.success || !result.retryable {
            return false;
        }
        max_attempts = max_attempts.max(result.attempts);
    }
    max_attempts < MAX_CHANNEL_ATTEMPTS
}

/// Whether a failed notification is worth re-queueing: some deliverable
/// (channel, recipient) pair still has attempt budget. Used by the retry
/// scanner; the fan-out loop applies the same predicate per pair.
pub fn needs_retry(record: &NotificationRecord, prior: &[DeliveryResult]) -> bool {
    let channels = record.channel_list();
    record.recipients().iter().any(|recipient| {
        let recipient_json = serde_json::to_value(recipient).unwrap_or_default();
        channels
            .iter()
            .any(|&channel| {
                variant_matches(channel, recipient)
                    && pair_should_attempt(prior, channel, &recipient_json)
            })
    })
}

/// Whether a recipient variant can be addressed on a channel at all.
/// Mismatched pairs in the fan-out cross product are skipped silently;
/// matching pairs with invalid values fail as permanent errors in the
/// router.
pub fn variant_matches(channel: Channel, recipient: &Recipient) -> bool {
    matches!(
        (channel, recipient),
        (Channel::Email, Recipient::Email { .. })
            | (Channel::Sms, Recipient::Phone { .. })
            | (Channel::Push, Recipient::DeviceToken { .. })
            | (Channel::InApp, Recipient::UserId { .. })
            | (Channel::Webhook, Recipient::WebhookUrl { .. })
    )
}

/// Rate-limit scope for one delivery: the recipient's user, else the
/// request context's user, else the tenant, else global.
pub fn rate_scope(record: &NotificationRecord, recipient: &Recipient) -> (RateLimitScope, String) {
    if let Some(user_id) = recipient.user_id() {
        return (RateLimitScope::User, format!("user:{user_id}"));
    }
    if let Some(user_id) = &record.user_id {
        return (RateLimitScope::User, format!("user:{user_id}"));
    }
    if let Some(tenant_id) = &record.tenant_id {
        return (RateLimitScope::Tenant, format!("tenant:{tenant_id}"));
    }
    (RateLimitScope::Global, "global".to_string())
}

/// The user a content-dedup check is keyed on: the request context's user,
/// else the single user recipient.
fn dedup_user(request: &NotificationRequest) -> Option<&str> {
    request
        .context
        .user_id
        .as_deref()
        .or_else(|| request.recipients.iter().find_map(|r| r.user_id()))
}

/// Stable digest input for content dedup: type plus template variables.
/// Rendering has not happened at intake, but two requests with the same
/// type and variables produce the same content.
fn dedup_content(request: &NotificationRequest) -> String {
    format!(
        "{}:{}",
        request.notification_type, request.template_variables
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_common::types::{NotificationType, Priority, RequestContext};

    fn make_result(channel: Channel, success: bool) -> DeliveryResult {
        DeliveryResult {
            id: Uuid::new_v4(),
            notification_id: Uuid::new_v4(),
            channel,
            recipient: serde_json::json!({"kind": "user_id", "user_id": "u1"}),
            success,
            // failures default to transient in tests
            retryable: !success,
            message_id: None,
            error_detail: (!success).then(|| "boom".to_string()),
            attempts: 1,
            delivered_at: success.then(Utc::now),
            created_at: Utc::now(),
        }
    }

    fn make_record() -> NotificationRecord {
        NotificationRecord {
            id: Uuid::new_v4(),
            notification_type: NotificationType::OrderConfirmation,
            priority: Priority::Normal,
            category: None,
            recipients: serde_json::json!([]),
            channels: serde_json::json!([]),
            template_variables: serde_json::json!({}),
            locale: None,
            tenant_id: None,
            user_id: None,
            correlation_id: None,
            source: None,
            status: NotificationStatus::Queued,
            scheduled_at: None,
            expires_at: None,
            idempotency_key: None,
            created_at: Utc::now(),
            processed_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_partial_success_is_sent() {
        let results = [
            make_result(Channel::Email, false),
            make_result(Channel::InApp, true),
        ];
        assert_eq!(overall_status(results.iter()), NotificationStatus::Sent);
    }

    #[test]
    fn test_all_failed_is_failed() {
        let results = [
            make_result(Channel::Email, false),
            make_result(Channel::Sms, false),
        ];
        assert_eq!(overall_status(results.iter()), NotificationStatus::Failed);
    }

    #[test]
    fn test_no_results_is_failed() {
        assert_eq!(overall_status([].iter()), NotificationStatus::Failed);
    }

    #[test]
    fn test_variant_matches() {
        let user = Recipient::UserId { user_id: "u1".into() };
        assert!(variant_matches(Channel::InApp, &user));
        assert!(!variant_matches(Channel::Email, &user));

        let email = Recipient::Email { email: "a@b.c".into() };
        assert!(variant_matches(Channel::Email, &email));
        assert!(!variant_matches(Channel::Push, &email));

        let hook = Recipient::WebhookUrl { webhook_url: "https://x".into() };
        assert!(variant_matches(Channel::Webhook, &hook));
        assert!(!variant_matches(Channel::Sms, &hook));
    }

    #[test]
    fn test_rate_scope_prefers_recipient_user() {
        let mut record = make_record();
        record.tenant_id = Some("t1".to_string());
        let recipient = Recipient::UserId { user_id: "u9".into() };
        let (scope, key) = rate_scope(&record, &recipient);
        assert_eq!(scope, RateLimitScope::User);
        assert_eq!(key, "user:u9");
    }

    #[test]
    fn test_rate_scope_falls_back_to_tenant_then_global() {
        let mut record = make_record();
        record.tenant_id = Some("t1".to_string());
        let recipient = Recipient::Email { email: "a@b.c".into() };
        let (scope, key) = rate_scope(&record, &recipient);
        assert_eq!(scope, RateLimitScope::Tenant);
        assert_eq!(key, "tenant:t1");

        record.tenant_id = None;
        let (scope, key) = rate_scope(&record, &recipient);
        assert_eq!(scope, RateLimitScope::Global);
        assert_eq!(key, "global");
    }

    #[test]
    fn test_pair_attempt_budget() {
        let recipient = serde_json::json!({"kind": "user_id", "user_id": "u1"});

        // No prior results: full budget.
        assert!(pair_should_attempt(&[], Channel::InApp, &recipient));

        // Transient failure below the budget: try again.
        let transient = make_result(Channel::InApp, false);
        assert!(pair_should_attempt(
            std::slice::from_ref(&transient),
            Channel::InApp,
            &recipient
        ));

        // Budget spent.
        let mut exhausted = make_result(Channel::InApp, false);
        exhausted.attempts = MAX_CHANNEL_ATTEMPTS;
        assert!(!pair_should_attempt(
            std::slice::from_ref(&exhausted),
            Channel::InApp,
            &recipient
        ));

        // Delivered already.
        let delivered = make_result(Channel::InApp, true);
        assert!(!pair_should_attempt(
            std::slice::from_ref(&delivered),
            Channel::InApp,
            &recipient
        ));

        // A different channel's results do not consume this pair's budget.
        assert!(pair_should_attempt(
            std::slice::from_ref(&exhausted),
            Channel::Email,
            &recipient
        ));
    }

    #[test]
    fn test_permanent_failure_is_terminal_for_pair() {
        // An invalid address fails permanently on the first attempt; the
        // pair must never be re-sent even though attempts < budget.
        let recipient = serde_json::json!({"kind": "user_id", "user_id": "u1"});
        let mut permanent = make_result(Channel::InApp, false);
        permanent.retryable = false;
        assert!(permanent.attempts < MAX_CHANNEL_ATTEMPTS);
        assert!(!pair_should_attempt(
            std::slice::from_ref(&permanent),
            Channel::InApp,
            &recipient
        ));
    }

    #[test]
    fn test_needs_retry_only_for_permanent_failures_is_false() {
        let mut record = make_record();
        record.recipients = serde_json::json!([{"kind": "user_id", "user_id": "u1"}]);
        record.channels = serde_json::json!(["in_app"]);

        let mut permanent = make_result(Channel::InApp, false);
        permanent.retryable = false;
        assert!(!needs_retry(&record, std::slice::from_ref(&permanent)));
    }

    #[test]
    fn test_needs_retry_sees_untried_pair() {
        // One channel exhausted its budget; a second requested channel was
        // rate-limited on every cycle and has no result rows at all. The
        // record must still be re-queued for the untried pair.
        let mut record = make_record();
        record.recipients = serde_json::json!([{"kind": "user_id", "user_id": "u1"}]);
        record.channels = serde_json::json!(["in_app", "email"]);

        let mut exhausted = make_result(Channel::InApp, false);
        exhausted.attempts = MAX_CHANNEL_ATTEMPTS;
        // Email never matches a user_id recipient, so only in_app counts
        // and its budget is gone.
        assert!(!needs_retry(&record, std::slice::from_ref(&exhausted)));

        // With an addressable second recipient the untried email pair keeps
        // the record retryable.
        record.recipients = serde_json::json!([
            {"kind": "user_id", "user_id": "u1"},
            {"kind": "email", "email": "buyer@example.com"},
        ]);
        assert!(needs_retry(&record, std::slice::from_ref(&exhausted)));
    }

    #[test]
    fn test_order_confirmation_respects_channel_preference() {
        // User allows only in-app for order confirmations; the request asks
        // for email + in-app. Exactly one deliverable pair must remain.
        let resolved = crate::preferences::ResolvedPreference {
            channels: vec![Channel::InApp],
            is_enabled: true,
            quiet_hours: None,
        };
        let requested = vec![Channel::Email, Channel::InApp];
        let recipient = Recipient::UserId { user_id: "u1".into() };

        let allowed = resolved.filter(&requested);
        let pairs: Vec<Channel> = allowed
            .into_iter()
            .filter(|&c| variant_matches(c, &recipient))
            .collect();
        assert_eq!(pairs, vec![Channel::InApp]);
    }

    #[test]
    fn test_dedup_content_stable() {
        let request = NotificationRequest {
            notification_type: NotificationType::OrderConfirmation,
            recipients: vec![Recipient::UserId { user_id: "u1".into() }],
            channels: vec![Channel::InApp],
            priority: Priority::Normal,
            category: None,
            template_variables: serde_json::json!({"orderNumber": "ORD-1"}),
            context: RequestContext::default(),
            locale: None,
            scheduled_at: None,
            expires_at: None,
            idempotency_key: None,
            strict_idempotency: false,
        };
        assert_eq!(dedup_content(&request), dedup_content(&request.clone()));
        assert_eq!(dedup_user(&request), Some("u1"));
    }
}
