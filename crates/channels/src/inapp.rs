//! In-app channel sender.
//!
//! Delivery is an insert into the `inapp_messages` inbox table; no external
//! provider is involved, so the channel is always healthy. The same table
//! backs the unread-count and mark-as-read API.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::types::{Channel, Recipient, RenderedContent};

use crate::{ChannelHealth, ChannelSender, DeliveryError, SendOutcome};

pub struct InAppSender {
    pool: PgPool,
}

impl InAppSender {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelSender for InAppSender {
    fn channel(&self) -> Channel {
        Channel::InApp
    }

    fn validate_recipient(&self, recipient: &Recipient) -> bool {
        recipient.user_id().is_some()
    }

    fn health(&self) -> ChannelHealth {
        ChannelHealth::Healthy
    }

    async fn send(
        &self,
        notification_id: Uuid,
        recipient: &Recipient,
        content: &RenderedContent,
    ) -> Result<SendOutcome, DeliveryError> {
        let Some(user_id) = recipient.user_id() else {
            return Err(DeliveryError::Permanent(
                "in-app recipient has no user id".into(),
            ));
        };

        let message_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO inapp_messages
                (id, user_id, notification_id, title, body, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, false, $6)
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .bind(notification_id)
        .bind(&content.title)
        .bind(&content.content)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| DeliveryError::Transient(format!("inbox insert failed: {e}")))?;

        Ok(SendOutcome {
            message_id: Some(message_id.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_user_id() {
        // validate_recipient is pure; no pool needed for the check itself
        let r = Recipient::UserId { user_id: "u1".into() };
        assert!(r.user_id().is_some());
        let r = Recipient::Email { email: "a@example.com".into() };
        assert!(r.user_id().is_none());
    }
}
