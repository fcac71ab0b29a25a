//! HMAC payload signatures for webhook deliveries.
//!
//! The JSON body is signed with HMAC-SHA256 under the subscription secret
//! and sent as `X-Webhook-Signature: sha256=<hex>`. Verification uses the
//! Mac's constant-time comparison.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Sign a payload, producing the full header value.
pub fn sign(payload: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a received signature header against the payload. Comparison is
/// constant-time; malformed headers simply fail.
pub fn verify(payload: &str, secret: &str, signature_header: &str) -> bool {
    let Some(hex_digest) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_round_trip() {
        let payload = r#"{"event":"order.created","id":"1"}"#;
        let signature = sign(payload, "topsecret");
        assert!(signature.starts_with("sha256="));
        assert!(verify(payload, "topsecret", &signature));
    }

    #[test]
    fn test_sign_deterministic() {
        assert_eq!(sign("abc", "k"), sign("abc", "k"));
        assert_ne!(sign("abc", "k"), sign("abd", "k"));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let signature = sign("payload", "right");
        assert!(!verify("payload", "wrong", &signature));
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let signature = sign("payload", "k");
        assert!(!verify("payload2", "k", &signature));
    }

    #[test]
    fn test_verify_rejects_malformed_header() {
        assert!(!verify("payload", "k", "md5=abcdef"));
        assert!(!verify("payload", "k", "sha256=nothex"));
        assert!(!verify("payload", "k", ""));
    }
}
