//! Channel senders and the router that fans deliveries out to them.
//!
//! The channel set is closed: Email, SMS, Push, In-App, Webhook. Each sender
//! implements the same capability contract (`send`, `validate_recipient`,
//! `health`) and the router dispatches with a `match`, so adding a channel
//! is a compile-time change, not a runtime registry mutation.

pub mod email;
pub mod inapp;
pub mod providers;
pub mod push;
pub mod router;
pub mod sms;
pub mod webhook;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use courier_common::types::{Channel, Recipient, RenderedContent};

pub use router::ChannelRouter;

/// Failure taxonomy for one delivery attempt.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network failure, timeout, or provider 5xx — retryable.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Invalid address, token, or provider 4xx — never retried.
    #[error("permanent recipient error: {0}")]
    Permanent(String),

    /// Provider-side throttling (429) — retryable after backoff.
    #[error("provider rate limited: {0}")]
    RateLimited(String),

    /// Missing provider credentials; the channel fails fast instead of
    /// hanging on a doomed call.
    #[error("channel not configured: {0}")]
    Config(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Transient(_) | DeliveryError::RateLimited(_)
        )
    }
}

/// Successful provider response.
#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    pub message_id: Option<String>,
}

/// Sender readiness, fixed at construction from available credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelHealth {
    Healthy,
    Unconfigured,
}

/// Uniform capability contract every channel sender implements.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    /// Whether this sender can address the given recipient variant.
    fn validate_recipient(&self, recipient: &Recipient) -> bool;

    fn health(&self) -> ChannelHealth;

    async fn send(
        &self,
        notification_id: Uuid,
        recipient: &Recipient,
        content: &RenderedContent,
    ) -> Result<SendOutcome, DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(DeliveryError::Transient("timeout".into()).is_retryable());
        assert!(DeliveryError::RateLimited("429".into()).is_retryable());
        assert!(!DeliveryError::Permanent("bad address".into()).is_retryable());
        assert!(!DeliveryError::Config("no api key".into()).is_retryable());
    }
}
