//! Preference resolver — which channels a user permits for a notification.
//!
//! Lookup order: type-specific preference → the user's `all` preference →
//! the built-in per-type default channel set. Quiet hours are evaluated in
//! the user's timezone with wrap-around for overnight windows; only
//! `Urgent` notifications bypass them.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use sqlx::PgPool;

use courier_common::error::AppError;
use courier_common::types::{Channel, NotificationType, Preference, Priority};

/// Preference row key covering every notification type.
const ALL_TYPES: &str = "all";

/// A user's quiet-hours window, in their local time.
#[derive(Debug, Clone, PartialEq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub tz: Tz,
}

impl QuietHours {
    /// Whether `now` falls inside the window in the user's local time.
    ///
    /// Overnight windows wrap: for `start > end` (e.g. 22:00–08:00) the
    /// check is `now >= start || now <= end`.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz).time();
        if self.start <= self.end {
            local >= self.start && local < self.end
        } else {
            local >= self.start || local <= self.end
        }
    }
}

/// Result of resolving a user's preference for one notification type.
#[derive(Debug, Clone)]
pub struct ResolvedPreference {
    pub channels: Vec<Channel>,
    pub is_enabled: bool,
    pub quiet_hours: Option<QuietHours>,
}

impl ResolvedPreference {
    /// Intersect the requested channels with the permitted set. A disabled
    /// preference permits nothing.
    pub fn filter(&self, requested: &[Channel]) -> Vec<Channel> {
        if !self.is_enabled {
            return Vec::new();
        }
        requested
            .iter()
            .copied()
            .filter(|c| self.channels.contains(c))
            .collect()
    }

    /// Whether delivery should be suppressed right now. Urgent priority
    /// always passes.
    pub fn suppressed_by_quiet_hours(&self, priority: Priority, now: DateTime<Utc>) -> bool {
        if priority == Priority::Urgent {
            return false;
        }
        self.quiet_hours.as_ref().is_some_and(|q| q.contains(now))
    }
}

#[derive(Clone)]
pub struct PreferenceResolver {
    pool: PgPool,
}

impl PreferenceResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve the effective preference for a user and notification type.
    pub async fn resolve(
        &self,
        user_id: &str,
        notification_type: NotificationType,
    ) -> Result<ResolvedPreference, AppError> {
        for type_key in [notification_type.to_string(), ALL_TYPES.to_string()] {
            let row: Option<Preference> = sqlx::query_as(
                r#"
                SELECT * FROM preferences
                WHERE user_id = $1 AND notification_type = $2
                "#,
            )
            .bind(user_id)
            .bind(&type_key)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(pref) = row {
                return Ok(resolve_row(&pref));
            }
        }

        Ok(ResolvedPreference {
            channels: default_channels(notification_type),
            is_enabled: true,
            quiet_hours: None,
        })
    }
}

fn resolve_row(pref: &Preference) -> ResolvedPreference {
    let quiet_hours = match (&pref.quiet_start, &pref.quiet_end, &pref.quiet_tz) {
        (Some(start), Some(end), tz) => {
            let tz = tz
                .as_deref()
                .and_then(|name| name.parse::<Tz>().ok())
                .unwrap_or(chrono_tz::UTC);
            Some(QuietHours {
                start: *start,
                end: *end,
                tz,
            })
        }
        _ => None,
    };

    ResolvedPreference {
        channels: pref.channel_list(),
        is_enabled: pref.is_enabled,
        quiet_hours,
    }
}

/// Recommended channel set per notification type, used when the user has
/// no stored preference.
pub fn default_channels(notification_type: NotificationType) -> Vec<Channel> {
    use Channel::*;
    match notification_type {
        NotificationType::OrderConfirmation => vec![Email, InApp],
        NotificationType::OrderShipped => vec![Email, Push, InApp],
        NotificationType::PaymentReceived => vec![Email, InApp],
        NotificationType::PaymentFailed => vec![Email, Sms, InApp],
        NotificationType::ListingApproved => vec![Email, InApp],
        NotificationType::ListingRejected => vec![Email, InApp],
        NotificationType::MessageReceived => vec![Push, InApp],
        NotificationType::ReviewReceived => vec![InApp],
        NotificationType::PriceAlert => vec![Push, InApp],
        NotificationType::SystemAnnouncement => vec![Email, InApp],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn quiet(start: &str, end: &str, tz: Tz) -> QuietHours {
        QuietHours {
            start: start.parse().unwrap(),
            end: end.parse().unwrap(),
            tz,
        }
    }

    fn utc_at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_overnight_window_wraps() {
        let q = quiet("22:00:00", "08:00:00", chrono_tz::UTC);
        assert!(q.contains(utc_at(23, 0)));
        assert!(q.contains(utc_at(3, 0)));
        assert!(!q.contains(utc_at(12, 0)));
    }

    #[test]
    fn test_daytime_window() {
        let q = quiet("09:00:00", "17:00:00", chrono_tz::UTC);
        assert!(q.contains(utc_at(12, 0)));
        assert!(!q.contains(utc_at(8, 59)));
        assert!(!q.contains(utc_at(17, 0)));
    }

    #[test]
    fn test_window_respects_timezone() {
        // 22:00–08:00 in New York; 03:00 UTC is 22:00 or 23:00 local
        // depending on DST — either way inside the window.
        let q = quiet("22:00:00", "08:00:00", chrono_tz::America::New_York);
        assert!(q.contains(utc_at(3, 0)));
        // 16:00 UTC is around noon in New York — outside.
        assert!(!q.contains(utc_at(16, 0)));
    }

    #[test]
    fn test_urgent_bypasses_quiet_hours() {
        let resolved = ResolvedPreference {
            channels: vec![Channel::Email],
            is_enabled: true,
            quiet_hours: Some(quiet("22:00:00", "08:00:00", chrono_tz::UTC)),
        };
        let night = utc_at(23, 0);
        assert!(resolved.suppressed_by_quiet_hours(Priority::Normal, night));
        assert!(resolved.suppressed_by_quiet_hours(Priority::High, night));
        assert!(!resolved.suppressed_by_quiet_hours(Priority::Urgent, night));
    }

    #[test]
    fn test_filter_intersects() {
        let resolved = ResolvedPreference {
            channels: vec![Channel::InApp],
            is_enabled: true,
            quiet_hours: None,
        };
        let allowed = resolved.filter(&[Channel::Email, Channel::InApp]);
        assert_eq!(allowed, vec![Channel::InApp]);
    }

    #[test]
    fn test_filter_disabled_is_empty() {
        let resolved = ResolvedPreference {
            channels: vec![Channel::Email, Channel::InApp],
            is_enabled: false,
            quiet_hours: None,
        };
        assert!(resolved.filter(&[Channel::Email, Channel::InApp]).is_empty());
    }

    #[test]
    fn test_default_channels_cover_every_type() {
        use NotificationType::*;
        for nt in [
            OrderConfirmation,
            OrderShipped,
            PaymentReceived,
            PaymentFailed,
            ListingApproved,
            ListingRejected,
            MessageReceived,
            ReviewReceived,
            PriceAlert,
            SystemAnnouncement,
        ] {
            assert!(!default_channels(nt).is_empty());
        }
    }

    #[test]
    fn test_resolve_row_bad_tz_falls_back_to_utc() {
        let pref = Preference {
            id: uuid::Uuid::new_v4(),
            user_id: "u1".to_string(),
            notification_type: "all".to_string(),
            channels: serde_json::json!(["email"]),
            is_enabled: true,
            quiet_start: Some("22:00:00".parse().unwrap()),
            quiet_end: Some("08:00:00".parse().unwrap()),
            quiet_tz: Some("Not/AZone".to_string()),
            frequency: courier_common::types::Frequency::Immediate,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let resolved = resolve_row(&pref);
        assert_eq!(resolved.quiet_hours.unwrap().tz, chrono_tz::UTC);
    }
}
