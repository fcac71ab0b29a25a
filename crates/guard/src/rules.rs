//! Rate-limit rule store.
//!
//! Rules are owned by the store and injected into the limiter at
//! construction; reloads from the `rate_limit_rules` table are explicit
//! calls, never ambient global state. Resolution falls back from the exact
//! (channel, scope) pair to (channel, Global), then to unrestricted.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Channel, RateLimitRule, RateLimitScope};

/// Injectable store of rate-limit rules, seeded with per-channel defaults.
#[derive(Clone)]
pub struct RuleStore {
    rules: Arc<RwLock<HashMap<(Channel, RateLimitScope), RateLimitRule>>>,
}

impl RuleStore {
    /// Create a store holding only the built-in defaults.
    pub fn with_defaults() -> Self {
        let mut rules = HashMap::new();
        for rule in default_rules() {
            rules.insert((rule.channel, rule.scope), rule);
        }
        Self {
            rules: Arc::new(RwLock::new(rules)),
        }
    }

    /// Replace database-defined rules on top of the defaults.
    pub async fn reload(&self, pool: &PgPool) -> Result<usize, AppError> {
        let loaded: Vec<RateLimitRule> = sqlx::query_as("SELECT * FROM rate_limit_rules")
            .fetch_all(pool)
            .await?;
        let count = loaded.len();

        let mut rules = self.rules.write();
        rules.clear();
        for rule in default_rules() {
            rules.insert((rule.channel, rule.scope), rule);
        }
        for rule in loaded {
            rules.insert((rule.channel, rule.scope), rule);
        }

        tracing::info!(count, "Rate limit rules reloaded");
        Ok(count)
    }

    /// Insert or replace a single rule.
    pub fn upsert(&self, rule: RateLimitRule) {
        self.rules.write().insert((rule.channel, rule.scope), rule);
    }

    /// Resolve the rule for a channel and scope: exact pair, then the
    /// channel's Global rule, then unrestricted (`None`).
    pub fn resolve(&self, channel: Channel, scope: RateLimitScope) -> Option<RateLimitRule> {
        let rules = self.rules.read();
        rules
            .get(&(channel, scope))
            .or_else(|| rules.get(&(channel, RateLimitScope::Global)))
            .cloned()
    }
}

/// Built-in defaults. Ceilings differ sharply by channel cost and abuse
/// profile: SMS is expensive and spam-prone, in-app is cheap.
fn default_rules() -> Vec<RateLimitRule> {
    let rule = |channel, minute, hour, day, burst| RateLimitRule {
        id: Uuid::new_v4(),
        channel,
        scope: RateLimitScope::Global,
        max_per_minute: minute,
        max_per_hour: hour,
        max_per_day: day,
        burst_limit: burst,
    };

    vec![
        rule(Channel::Sms, 2, 10, 50, 3),
        rule(Channel::Email, 10, 60, 500, 15),
        rule(Channel::Push, 30, 300, 2000, 60),
        rule(Channel::InApp, 20, 200, 1000, 50),
        rule(Channel::Webhook, 60, 600, 5000, 120),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_channel() {
        let store = RuleStore::with_defaults();
        for channel in [
            Channel::Email,
            Channel::Sms,
            Channel::Push,
            Channel::InApp,
            Channel::Webhook,
        ] {
            assert!(store.resolve(channel, RateLimitScope::Global).is_some());
        }
    }

    #[test]
    fn test_scope_falls_back_to_global() {
        let store = RuleStore::with_defaults();
        // No user-scoped SMS rule exists, so the Global rule applies.
        let rule = store.resolve(Channel::Sms, RateLimitScope::User).unwrap();
        assert_eq!(rule.scope, RateLimitScope::Global);
        assert_eq!(rule.max_per_minute, 2);
        assert_eq!(rule.burst_limit, 3);
    }

    #[test]
    fn test_sms_tighter_than_inapp() {
        let store = RuleStore::with_defaults();
        let sms = store.resolve(Channel::Sms, RateLimitScope::Global).unwrap();
        let inapp = store.resolve(Channel::InApp, RateLimitScope::Global).unwrap();
        assert!(sms.max_per_day < inapp.max_per_day);
        assert!(sms.max_per_minute < inapp.max_per_minute);
    }
}
