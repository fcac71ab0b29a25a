//! Idempotency and content dedup guard.
//!
//! The idempotency claim is a single atomic `SET key id NX EX ttl`: the
//! winner stores its candidate notification id, losers read the winner's id
//! back with a follow-up `GET`. Content dedup hashes normalized content per
//! user under a short TTL window to catch near-duplicate sends that lack an
//! explicit key.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use courier_common::error::AppError;

/// Default TTL for an idempotency key (1 hour).
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 3600;

/// Default content dedup window (5 minutes).
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 300;

/// Outcome of an idempotency claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This caller won the key; its candidate id is now stored.
    Claimed,
    /// Another request already holds the key within its TTL.
    AlreadyExists(Uuid),
}

/// Redis-backed idempotency and content dedup guard.
#[derive(Clone)]
pub struct IdempotencyGuard {
    ttl_secs: u64,
    dedup_window_secs: u64,
}

impl IdempotencyGuard {
    pub fn new(ttl_secs: u64, dedup_window_secs: u64) -> Self {
        Self {
            ttl_secs,
            dedup_window_secs,
        }
    }

    /// Atomically claim an idempotency key for `candidate_id`.
    ///
    /// `SET key id NX EX ttl` returns `OK` only when the key was absent, so
    /// two concurrent requests with the same key cannot both claim it. When
    /// the claim loses, the winner's notification id is read back.
    pub async fn claim(
        &self,
        redis: &mut ConnectionManager,
        key: &str,
        candidate_id: Uuid,
    ) -> Result<Claim, AppError> {
        let redis_key = Self::idempotency_key(key);

        let set: Option<String> = redis::cmd("SET")
            .arg(&redis_key)
            .arg(candidate_id.to_string())
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(redis)
            .await?;

        if set.is_some() {
            return Ok(Claim::Claimed);
        }

        let existing: Option<String> = redis.get(&redis_key).await?;
        match existing.as_deref().and_then(|s| Uuid::parse_str(s).ok()) {
            Some(id) => {
                tracing::debug!(
                    idempotency_key = key,
                    notification_id = %id,
                    "Idempotency key replayed"
                );
                Ok(Claim::AlreadyExists(id))
            }
            // The winner's key expired between SET and GET; treat as claimed.
            None => Ok(Claim::Claimed),
        }
    }

    /// Drop a claim, e.g. when persisting the notification failed after the
    /// key was won.
    pub async fn release(
        &self,
        redis: &mut ConnectionManager,
        key: &str,
    ) -> Result<(), AppError> {
        redis.del::<_, ()>(Self::idempotency_key(key)).await?;
        Ok(())
    }

    /// Check whether equivalent content was already sent to this user within
    /// the dedup window, and if not, record it.
    ///
    /// Returns `true` when the content is a duplicate. The record-and-check
    /// is the same atomic `SET NX EX` as the idempotency claim.
    pub async fn is_duplicate_content(
        &self,
        redis: &mut ConnectionManager,
        user_id: &str,
        content: &str,
    ) -> Result<bool, AppError> {
        let key = format!("courier:dedup:{}:{}", user_id, content_hash(content));

        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.dedup_window_secs)
            .query_async(redis)
            .await?;

        Ok(set.is_none())
    }

    fn idempotency_key(key: &str) -> String {
        format!("courier:idem:{key}")
    }
}

/// Hash of normalized (trimmed, lowercased) content.
pub fn content_hash(content: &str) -> String {
    let normalized = content.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_normalizes() {
        assert_eq!(content_hash("  Hello World  "), content_hash("hello world"));
        assert_eq!(content_hash("HELLO\n"), content_hash("hello"));
    }

    #[test]
    fn test_content_hash_distinguishes() {
        assert_ne!(content_hash("hello"), content_hash("goodbye"));
    }

    #[test]
    fn test_idempotency_key_namespace() {
        assert_eq!(
            IdempotencyGuard::idempotency_key("order-1"),
            "courier:idem:order-1"
        );
    }
}
