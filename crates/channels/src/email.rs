//! Email channel sender.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use courier_common::types::{Channel, Recipient, RenderedContent};

use crate::providers::EmailProvider;
use crate::{ChannelHealth, ChannelSender, DeliveryError, SendOutcome};

pub struct EmailSender {
    provider: Option<Arc<dyn EmailProvider>>,
}

impl EmailSender {
    /// An email sender without a provider reports `Unconfigured` and fails
    /// fast on send.
    pub fn new(provider: Option<Arc<dyn EmailProvider>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn validate_recipient(&self, recipient: &Recipient) -> bool {
        matches!(recipient, Recipient::Email { email } if email.contains('@'))
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
            .ok_or_else(|| DeliveryError::Config("email provider credentials missing".into()))?;

        let Recipient::Email { email } = recipient else {
            return Err(DeliveryError::Permanent(
                "recipient has no email address".into(),
            ));
        };

        let subject = content.subject.as_deref().unwrap_or("Notification");
        provider
            .send_email(email, subject, &content.content, content.html_content.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_recipient() {
        let sender = EmailSender::new(None);
        assert!(sender.validate_recipient(&Recipient::Email {
            email: "a@example.com".into()
        }));
        assert!(!sender.validate_recipient(&Recipient::Email {
            email: "not-an-address".into()
        }));
        assert!(!sender.validate_recipient(&Recipient::UserId { user_id: "u1".into() }));
    }

    #[test]
    fn test_unconfigured_health() {
        let sender = EmailSender::new(None);
        assert_eq!(sender.health(), ChannelHealth::Unconfigured);
    }

    #[tokio::test]
    async fn test_unconfigured_send_fails_fast() {
        let sender = EmailSender::new(None);
        let err = sender
            .send(
                Uuid::new_v4(),
                &Recipient::Email {
                    email: "a@example.com".into(),
                },
                &RenderedContent {
                    content: "hi".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Config(_)));
    }
}
