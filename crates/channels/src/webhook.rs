//! Webhook channel sender.
//!
//! Posts rendered content as JSON to the recipient's webhook URL. This is
//! the per-recipient channel variant; subscription-based fan-out with
//! signing and retry lives in `courier-webhooks`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

use courier_common::types::{Channel, Recipient, RenderedContent};

use crate::providers::{classify_status, classify_transport};
use crate::{ChannelHealth, ChannelSender, DeliveryError, SendOutcome};

pub struct WebhookChannelSender {
    client: Client,
}

impl WebhookChannelSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelSender for WebhookChannelSender {
    fn channel(&self) -> Channel {
        Channel::Webhook
    }

    fn validate_recipient(&self, recipient: &Recipient) -> bool {
        matches!(recipient, Recipient::WebhookUrl { webhook_url }
            if webhook_url.starts_with("http://") || webhook_url.starts_with("https://"))
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
        let Recipient::WebhookUrl { webhook_url } = recipient else {
            return Err(DeliveryError::Permanent(
                "recipient has no webhook url".into(),
            ));
        };

        let payload = json!({
            "notification_id": notification_id,
            "title": content.title,
            "subject": content.subject,
            "content": content.content,
        });

        let response = self
            .client
            .post(webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            Ok(SendOutcome::default())
        } else {
            let detail = response.text().await.unwrap_or_default();
            Err(classify_status(status, &detail))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_recipient_scheme() {
        let sender = WebhookChannelSender::new(Client::new());
        assert!(sender.validate_recipient(&Recipient::WebhookUrl {
            webhook_url: "https://example.com/hook".into()
        }));
        assert!(!sender.validate_recipient(&Recipient::WebhookUrl {
            webhook_url: "ftp://example.com".into()
        }));
        assert!(!sender.validate_recipient(&Recipient::UserId { user_id: "u1".into() }));
    }
}
