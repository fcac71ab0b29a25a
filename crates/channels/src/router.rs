//! Channel router — closed-set dispatch with uniform error wrapping.
//!
//! The router holds one sender per channel and no channel-specific logic.
//! Every sender failure, including the per-call deadline, is converted into
//! a failed `DeliveryResult` so one channel can never abort the fan-out
//! loop for the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::config::AppConfig;
use courier_common::types::{Channel, DeliveryResult, Recipient, RenderedContent};

use crate::email::EmailSender;
use crate::inapp::InAppSender;
use crate::providers::{HttpEmailProvider, HttpPushProvider, HttpSmsProvider};
use crate::push::PushSender;
use crate::sms::SmsSender;
use crate::webhook::WebhookChannelSender;
use crate::{ChannelHealth, ChannelSender, DeliveryError};

pub struct ChannelRouter {
    email: EmailSender,
    sms: SmsSender,
    push: PushSender,
    in_app: InAppSender,
    webhook: WebhookChannelSender,
    send_timeout: Duration,
}

impl ChannelRouter {
    pub fn new(
        email: EmailSender,
        sms: SmsSender,
        push: PushSender,
        in_app: InAppSender,
        webhook: WebhookChannelSender,
        send_timeout: Duration,
    ) -> Self {
        Self {
            email,
            sms,
            push,
            in_app,
            webhook,
            send_timeout,
        }
    }

    /// Build the router from configuration. Channels whose provider
    /// credentials are absent come up `Unconfigured` and fail fast.
    pub fn from_config(config: &AppConfig, pool: PgPool) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()
            .unwrap_or_default();

        let email_provider = match (&config.email_api_key, &config.email_from) {
            (Some(key), Some(from)) => Some(Arc::new(HttpEmailProvider::new(
                client.clone(),
                key.clone(),
                from.clone(),
            )) as Arc<dyn crate::providers::EmailProvider>),
            _ => {
                tracing::warn!("Email channel unconfigured (EMAIL_API_KEY / EMAIL_FROM missing)");
                None
            }
        };

        let sms_provider = match (&config.sms_api_key, &config.sms_from) {
            (Some(key), Some(from)) => Some(Arc::new(HttpSmsProvider::new(
                client.clone(),
                "https://api.sms.example.com/messages".to_string(),
                key.clone(),
                from.clone(),
            )) as Arc<dyn crate::providers::SmsProvider>),
            _ => {
                tracing::warn!("SMS channel unconfigured (SMS_API_KEY / SMS_FROM missing)");
                None
            }
        };

        let push_provider = config.push_api_key.as_ref().map(|key| {
            Arc::new(HttpPushProvider::new(
                client.clone(),
                "https://fcm.googleapis.com/v1/messages:send".to_string(),
                key.clone(),
            )) as Arc<dyn crate::providers::PushProvider>
        });
        if push_provider.is_none() {
            tracing::warn!("Push channel unconfigured (PUSH_API_KEY missing)");
        }

        Self::new(
            EmailSender::new(email_provider),
            SmsSender::new(sms_provider),
            PushSender::new(push_provider),
            InAppSender::new(pool),
            WebhookChannelSender::new(client),
            Duration::from_secs(config.provider_timeout_secs),
        )
    }

    fn sender(&self, channel: Channel) -> &dyn ChannelSender {
        match channel {
            Channel::Email => &self.email,
            Channel::Sms => &self.sms,
            Channel::Push => &self.push,
            Channel::InApp => &self.in_app,
            Channel::Webhook => &self.webhook,
        }
    }

    pub fn health(&self, channel: Channel) -> ChannelHealth {
        self.sender(channel).health()
    }

    /// Deliver to one recipient on one channel, always producing a
    /// `DeliveryResult` — errors are recorded, never propagated.
    pub async fn deliver(
        &self,
        notification_id: Uuid,
        channel: Channel,
        recipient: &Recipient,
        content: &RenderedContent,
        attempt: i32,
    ) -> DeliveryResult {
        let sender = self.sender(channel);

        let outcome = if sender.health() == ChannelHealth::Unconfigured {
            Err(DeliveryError::Config(format!(
                "{channel} channel has no provider configured"
            )))
        } else if !sender.validate_recipient(recipient) {
            Err(DeliveryError::Permanent(format!(
                "recipient cannot be addressed on {channel}"
            )))
        } else {
            match tokio::time::timeout(
                self.send_timeout,
                sender.send(notification_id, recipient, content),
            )
            .await
            {
                Ok(result) => result,
                // A hung provider call fails into the retry path, never hangs
                // the worker.
                Err(_) => Err(DeliveryError::Transient(format!(
                    "send timed out after {:?}",
                    self.send_timeout
                ))),
            }
        };

        let now = Utc::now();
        match outcome {
            Ok(sent) => DeliveryResult {
                id: Uuid::new_v4(),
                notification_id,
                channel,
                recipient: serde_json::to_value(recipient).unwrap_or_default(),
                success: true,
                retryable: false,
                message_id: sent.message_id,
                error_detail: None,
                attempts: attempt,
                delivered_at: Some(now),
                created_at: now,
            },
            Err(e) => {
                tracing::warn!(
                    notification_id = %notification_id,
                    channel = %channel,
                    error = %e,
                    "Channel delivery failed"
                );
                DeliveryResult {
                    id: Uuid::new_v4(),
                    notification_id,
                    channel,
                    recipient: serde_json::to_value(recipient).unwrap_or_default(),
                    success: false,
                    retryable: e.is_retryable(),
                    message_id: None,
                    error_detail: Some(e.to_string()),
                    attempts: attempt,
                    delivered_at: None,
                    created_at: now,
                }
            }
        }
    }
}
