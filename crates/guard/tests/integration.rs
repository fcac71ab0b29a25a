//! Integration tests for the Redis-backed guard.
//!
//! Requires a running Redis with `REDIS_URL` env var set (defaults to
//! `redis://localhost:6379`). Run with:
//!
//! ```bash
//! REDIS_URL="redis://localhost:6379" \
//!   cargo test -p courier-guard --test integration -- --ignored --nocapture
//! ```

use redis::aio::ConnectionManager;
use uuid::Uuid;

use courier_common::types::{Channel, RateLimitRule, RateLimitScope};
use courier_guard::{Claim, IdempotencyGuard, RateLimiter, RuleStore};

async fn connect() -> ConnectionManager {
    let url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let client = redis::Client::open(url).unwrap();
    ConnectionManager::new(client).await.unwrap()
}

/// Unique key per test run so stale counters never bleed across runs.
fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

// ============================================================
// Idempotency: exactly one claim wins
// ============================================================

#[tokio::test]
#[ignore]
async fn test_idempotency_single_winner_under_contention() {
    let guard = IdempotencyGuard::new(60, 60);
    let key = unique("idem");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let guard = guard.clone();
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            let mut redis = connect().await;
            let candidate = Uuid::new_v4();
            let claim = guard.claim(&mut redis, &key, candidate).await.unwrap();
            (candidate, claim)
        }));
    }

    let mut winners = Vec::new();
    let mut replayed_ids = Vec::new();
    for task in tasks {
        let (candidate, claim) = task.await.unwrap();
        match claim {
            Claim::Claimed => winners.push(candidate),
            Claim::AlreadyExists(id) => replayed_ids.push(id),
        }
    }

    // Exactly one caller wins; every loser sees the winner's id.
    assert_eq!(winners.len(), 1);
    assert_eq!(replayed_ids.len(), 7);
    for id in replayed_ids {
        assert_eq!(id, winners[0]);
    }
}

#[tokio::test]
#[ignore]
async fn test_idempotency_replay_returns_original() {
    let guard = IdempotencyGuard::new(60, 60);
    let mut redis = connect().await;
    let key = unique("idem-replay");

    let first = Uuid::new_v4();
    assert_eq!(
        guard.claim(&mut redis, &key, first).await.unwrap(),
        Claim::Claimed
    );
    assert_eq!(
        guard.claim(&mut redis, &key, Uuid::new_v4()).await.unwrap(),
        Claim::AlreadyExists(first)
    );

    // Released keys can be claimed again.
    guard.release(&mut redis, &key).await.unwrap();
    assert_eq!(
        guard.claim(&mut redis, &key, Uuid::new_v4()).await.unwrap(),
        Claim::Claimed
    );
}

#[tokio::test]
#[ignore]
async fn test_content_dedup_within_window() {
    let guard = IdempotencyGuard::new(60, 60);
    let mut redis = connect().await;
    let user = unique("user");

    let first = guard
        .is_duplicate_content(&mut redis, &user, "Your order shipped")
        .await
        .unwrap();
    assert!(!first);

    // Same content normalized differently is still a duplicate.
    let second = guard
        .is_duplicate_content(&mut redis, &user, "  your ORDER shipped ")
        .await
        .unwrap();
    assert!(second);

    // A different user is unaffected.
    let other = guard
        .is_duplicate_content(&mut redis, &unique("user"), "Your order shipped")
        .await
        .unwrap();
    assert!(!other);
}

// ============================================================
// Rate limiter: monotonic within a window, fresh after rollover
// ============================================================

fn limiter_with_rule(burst: i64, minute: i64) -> RateLimiter {
    let rules = RuleStore::with_defaults();
    rules.upsert(RateLimitRule {
        id: Uuid::new_v4(),
        channel: Channel::Sms,
        scope: RateLimitScope::User,
        max_per_minute: minute,
        max_per_hour: 1000,
        max_per_day: 1000,
        burst_limit: burst,
    });
    RateLimiter::new(rules)
}

#[tokio::test]
#[ignore]
async fn test_rate_limit_monotonic_until_ceiling() {
    let limiter = limiter_with_rule(3, 3);
    let mut redis = connect().await;
    let scope_key = unique("user");
    let now = 1_700_000_000u64;

    for _ in 0..3 {
        let allowed = limiter
            .check_at(&mut redis, &scope_key, Channel::Sms, RateLimitScope::User, now)
            .await
            .unwrap();
        assert!(allowed);
    }

    // The fourth call in the same window is rejected, and stays rejected.
    for _ in 0..2 {
        let allowed = limiter
            .check_at(&mut redis, &scope_key, Channel::Sms, RateLimitScope::User, now)
            .await
            .unwrap();
        assert!(!allowed);
    }
}

#[tokio::test]
#[ignore]
async fn test_rate_limit_window_rollover() {
    let limiter = limiter_with_rule(2, 2);
    let mut redis = connect().await;
    let scope_key = unique("user");
    let now = 1_700_000_000u64;

    for _ in 0..2 {
        assert!(
            limiter
                .check_at(&mut redis, &scope_key, Channel::Sms, RateLimitScope::User, now)
                .await
                .unwrap()
        );
    }
    assert!(
        !limiter
            .check_at(&mut redis, &scope_key, Channel::Sms, RateLimitScope::User, now)
            .await
            .unwrap()
    );

    // One minute later the burst and minute buckets are fresh.
    let next_window = now + 60;
    assert!(
        limiter
            .check_at(&mut redis, &scope_key, Channel::Sms, RateLimitScope::User, next_window)
            .await
            .unwrap()
    );
}

#[tokio::test]
#[ignore]
async fn test_rate_limit_scope_keys_independent() {
    let limiter = limiter_with_rule(1, 1);
    let mut redis = connect().await;
    let now = 1_700_000_000u64;

    let key_a = unique("user");
    let key_b = unique("user");

    assert!(
        limiter
            .check_at(&mut redis, &key_a, Channel::Sms, RateLimitScope::User, now)
            .await
            .unwrap()
    );
    assert!(
        !limiter
            .check_at(&mut redis, &key_a, Channel::Sms, RateLimitScope::User, now)
            .await
            .unwrap()
    );

    // Exhausting one user's budget leaves another's untouched.
    assert!(
        limiter
            .check_at(&mut redis, &key_b, Channel::Sms, RateLimitScope::User, now)
            .await
            .unwrap()
    );
}
