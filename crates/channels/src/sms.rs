//! SMS channel sender.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use courier_common::types::{Channel, Recipient, RenderedContent};

use crate::providers::SmsProvider;
use crate::{ChannelHealth, ChannelSender, DeliveryError, SendOutcome};

pub struct SmsSender {
    provider: Option<Arc<dyn SmsProvider>>,
}

impl SmsSender {
    pub fn new(provider: Option<Arc<dyn SmsProvider>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    fn validate_recipient(&self, recipient: &Recipient) -> bool {
        // E.164-ish: leading + and at least 8 digits
        matches!(recipient, Recipient::Phone { phone }
            if phone.starts_with('+') && phone[1..].chars().filter(|c| c.is_ascii_digit()).count() >= 8)
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
            .ok_or_else(|| DeliveryError::Config("sms provider credentials missing".into()))?;

        let Recipient::Phone { phone } = recipient else {
            return Err(DeliveryError::Permanent(
                "recipient has no phone number".into(),
            ));
        };

        provider.send_sms(phone, &content.content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_recipient() {
        let sender = SmsSender::new(None);
        assert!(sender.validate_recipient(&Recipient::Phone {
            phone: "+15551234567".into()
        }));
        assert!(!sender.validate_recipient(&Recipient::Phone {
            phone: "555-1234".into()
        }));
        assert!(!sender.validate_recipient(&Recipient::Phone { phone: "+123".into() }));
        assert!(!sender.validate_recipient(&Recipient::Email {
            email: "a@example.com".into()
        }));
    }
}
