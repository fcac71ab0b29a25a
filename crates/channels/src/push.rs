//! Push channel sender.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use courier_common::types::{Channel, Recipient, RenderedContent};

use crate::providers::PushProvider;
use crate::{ChannelHealth, ChannelSender, DeliveryError, SendOutcome};

pub struct PushSender {
    provider: Option<Arc<dyn PushProvider>>,
}

impl PushSender {
    pub fn new(provider: Option<Arc<dyn PushProvider>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChannelSender for PushSender {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    fn validate_recipient(&self, recipient: &Recipient) -> bool {
        matches!(recipient, Recipient::DeviceToken { device_token } if !device_token.is_empty())
    }

    fn health(&self) -> ChannelHealth {
        if self.provider.is_some() {
            ChannelHealth::Healthy
        } else {
            ChannelHealth::Unconfigured
        }
    }

    async fn send(
        &self,
        _notification_id: Uuid,
        recipient: &Recipient,
        content: &RenderedContent,
    ) -> Result<SendOutcome, DeliveryError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| DeliveryError::Config("push provider credentials missing".into()))?;

        let Recipient::DeviceToken { device_token } = recipient else {
            return Err(DeliveryError::Permanent(
                "recipient has no device token".into(),
            ));
        };

        let title = content.title.as_deref().unwrap_or("Notification");
        provider.send_push(device_token, title, &content.content).await
    }
}
