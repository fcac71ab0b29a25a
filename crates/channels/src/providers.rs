//! Opaque provider clients.
//!
//! Concrete wire protocols (SES, Twilio, FCM, ...) live behind these traits
//! as `send(...) → {success, message_id | error}`. The HTTP implementations
//! here post JSON to a configured endpoint; tests substitute in-memory
//! fakes.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;

use crate::{DeliveryError, SendOutcome};

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: Option<&str>,
    ) -> Result<SendOutcome, DeliveryError>;
}

#[async_trait]
pub trait SmsProvider: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<SendOutcome, DeliveryError>;
}

#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send_push(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
    ) -> Result<SendOutcome, DeliveryError>;
}

/// Map a provider HTTP status into the delivery taxonomy: 429 and 5xx are
/// retryable, other non-success codes are recipient/config faults.
pub(crate) fn classify_status(status: StatusCode, detail: &str) -> DeliveryError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        DeliveryError::RateLimited(format!("provider returned {status}: {detail}"))
    } else if status.is_server_error() {
        DeliveryError::Transient(format!("provider returned {status}: {detail}"))
    } else {
        DeliveryError::Permanent(format!("provider returned {status}: {detail}"))
    }
}

pub(crate) fn classify_transport(e: reqwest::Error) -> DeliveryError {
    DeliveryError::Transient(format!("transport error: {e}"))
}

async fn post_provider(
    client: &Client,
    endpoint: &str,
    api_key: &str,
    payload: serde_json::Value,
) -> Result<SendOutcome, DeliveryError> {
    let response = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(&payload)
        .send()
        .await
        .map_err(classify_transport)?;

    let status = response.status();
    if status.is_success() {
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        Ok(SendOutcome { message_id })
    } else {
        let detail = response.text().await.unwrap_or_default();
        Err(classify_status(status, &detail))
    }
}

/// Email over a Resend-style JSON HTTP API.
pub struct HttpEmailProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpEmailProvider {
    pub const DEFAULT_ENDPOINT: &str = "https://api.resend.com/emails";

    pub fn new(client: Client, api_key: String, from: String) -> Self {
        Self {
            client,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            api_key,
            from,
        }
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: Option<&str>,
    ) -> Result<SendOutcome, DeliveryError> {
        let mut payload = json!({
            "from": self.from,
            "to": [to],
            "subject": subject,
            "text": text,
        });
        if let Some(html) = html {
            payload["html"] = json!(html);
        }
        post_provider(&self.client, &self.endpoint, &self.api_key, payload).await
    }
}

/// SMS over a generic JSON HTTP API.
pub struct HttpSmsProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpSmsProvider {
    pub fn new(client: Client, endpoint: String, api_key: String, from: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl SmsProvider for HttpSmsProvider {
    async fn send_sms(&self, to: &str, body: &str) -> Result<SendOutcome, DeliveryError> {
        let payload = json!({
            "from": self.from,
            "to": to,
            "body": body,
        });
        post_provider(&self.client, &self.endpoint, &self.api_key, payload).await
    }
}

/// Push over an FCM-style JSON HTTP API.
pub struct HttpPushProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpPushProvider {
    pub fn new(client: Client, endpoint: String, api_key: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl PushProvider for HttpPushProvider {
    async fn send_push(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
    ) -> Result<SendOutcome, DeliveryError> {
        let payload = json!({
            "token": device_token,
            "notification": { "title": title, "body": body },
        });
        post_provider(&self.client, &self.endpoint, &self.api_key, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_429_rate_limited() {
        let e = classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(e, DeliveryError::RateLimited(_)));
        assert!(e.is_retryable());
    }

    #[test]
    fn test_classify_5xx_transient() {
        let e = classify_status(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(e.is_retryable());
    }

    #[test]
    fn test_classify_4xx_permanent() {
        let e = classify_status(StatusCode::UNPROCESSABLE_ENTITY, "bad address");
        assert!(!e.is_retryable());
    }
}
