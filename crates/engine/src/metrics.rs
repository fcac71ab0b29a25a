//! Delivery metrics, computed on demand from the notification and
//! delivery-result tables rather than kept as counters.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use courier_common::error::AppError;
use courier_common::types::{Channel, NotificationType};

/// Optional filters applied to every metrics query.
#[derive(Debug, Clone, Default)]
pub struct MetricsFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub tenant_id: Option<String>,
    pub notification_type: Option<NotificationType>,
}

/// Status breakdown over the filtered window.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryMetrics {
    pub total: i64,
    pub sent: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub pending: i64,
    pub success_rate: f64,
}

/// Per-channel attempt outcomes over the filtered window.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelPerformance {
    pub channel: Channel,
    pub succeeded: i64,
    pub failed: i64,
    pub success_rate: f64,
    pub avg_attempts: f64,
}

#[derive(sqlx::FromRow)]
struct StatusCountRow {
    status: String,
    count: i64,
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    channel: Channel,
    succeeded: i64,
    failed: i64,
    avg_attempts: f64,
}

pub struct MetricsStore {
    pool: PgPool,
}

impl MetricsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn delivery_metrics(
        &self,
        filter: &MetricsFilter,
    ) -> Result<DeliveryMetrics, AppError> {
        let rows: Vec<StatusCountRow> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) AS count
            FROM notifications
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
              AND ($3::text IS NULL OR tenant_id = $3)
              AND ($4::text IS NULL OR notification_type = $4)
            GROUP BY status
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(&filter.tenant_id)
        .bind(filter.notification_type.map(|t| t.to_string()))
        .fetch_all(&self.pool)
        .await?;

        let mut metrics = DeliveryMetrics {
            total: 0,
            sent: 0,
            failed: 0,
            cancelled: 0,
            pending: 0,
            success_rate: 0.0,
        };
        for row in rows {
            metrics.total += row.count;
            match row.status.as_str() {
                "sent" => metrics.sent += row.count,
                "failed" => metrics.failed += row.count,
                "cancelled" | "expired" => metrics.cancelled += row.count,
                // everything still moving through the pipeline
                _ => metrics.pending += row.count,
            }
        }
        let finished = metrics.sent + metrics.failed;
        if finished > 0 {
            metrics.success_rate = metrics.sent as f64 / finished as f64;
        }
        Ok(metrics)
    }

    pub async fn channel_performance(
        &self,
        filter: &MetricsFilter,
    ) -> Result<Vec<ChannelPerformance>, AppError> {
        let rows: Vec<ChannelRow> = sqlx::query_as(
            r#"
            SELECT
                r.channel,
                COUNT(*) FILTER (WHERE r.success) AS succeeded,
                COUNT(*) FILTER (WHERE NOT r.success) AS failed,
                COALESCE(AVG(r.attempts), 0)::float8 AS avg_attempts
            FROM delivery_results r
            JOIN notifications n ON n.id = r.notification_id
            WHERE ($1::timestamptz IS NULL OR r.created_at >= $1)
              AND ($2::timestamptz IS NULL OR r.created_at < $2)
              AND ($3::text IS NULL OR n.tenant_id = $3)
              AND ($4::text IS NULL OR n.notification_type = $4)
            GROUP BY r.channel
            ORDER BY r.channel
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(&filter.tenant_id)
        .bind(filter.notification_type.map(|t| t.to_string()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let attempts = row.succeeded + row.failed;
                ChannelPerformance {
                    channel: row.channel,
                    succeeded: row.succeeded,
                    failed: row.failed,
                    success_rate: if attempts > 0 {
                        row.succeeded as f64 / attempts as f64
                    } else {
                        0.0
                    },
                    avg_attempts: row.avg_attempts,
                }
            })
            .collect())
    }
}
