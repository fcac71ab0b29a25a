//! Dispatch scheduler — Redis-list queues, worker pools and scanners.
//!
//! Two logically separate queues keep "now" traffic away from bulk
//! fan-outs: `courier:queue:single` and `courier:queue:bulk`, each consumed
//! by its own worker pool with independent concurrency. Scanners re-queue
//! scheduled notifications once due and failed notifications still inside
//! their retry window.
//!
//! Shutdown is cooperative: workers finish the job in hand before exiting,
//! so no delivery is left mid-flight.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{DeliveryResult, NotificationRecord};

use crate::orchestrator::Orchestrator;

pub const SINGLE_QUEUE: &str = "courier:queue:single";
pub const BULK_QUEUE: &str = "courier:queue:bulk";

/// Maximum age of a failed notification the retry scanner will re-queue.
const RETRY_WINDOW_HOURS: i64 = 24;

/// A unit of work on one of the dispatch queues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    Single { notification_id: Uuid },
    Bulk { notification_id: Uuid },
}

/// Producer half of the dispatch queues.
#[derive(Clone)]
pub struct Dispatcher {
    redis: ConnectionManager,
}

impl Dispatcher {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn push_single(&self, notification_id: Uuid) -> Result<(), AppError> {
        self.push(SINGLE_QUEUE, &Job::Single { notification_id }).await
    }

    pub async fn push_bulk(&self, notification_id: Uuid) -> Result<(), AppError> {
        self.push(BULK_QUEUE, &Job::Bulk { notification_id }).await
    }

    async fn push(&self, queue: &str, job: &Job) -> Result<(), AppError> {
        let payload = serde_json::to_string(job)
            .map_err(|e| AppError::Internal(format!("job encode failed: {e}")))?;
        let mut redis = self.redis.clone();
        redis::cmd("LPUSH")
            .arg(queue)
            .arg(payload)
            .query_async::<()>(&mut redis)
            .await?;
        Ok(())
    }
}

/// Spawn `concurrency` workers consuming `queue`. Each worker blocks on
/// `BRPOP` with a short timeout so it can observe the shutdown signal
/// between jobs, and always finishes the job in hand before exiting.
///
/// `BRPOP` blocks its connection server-side, so every worker opens its
/// own connection from `client` instead of sharing the multiplexed
/// manager the guard and limiter run on.
pub fn spawn_workers(
    queue: &'static str,
    concurrency: usize,
    client: redis::Client,
    orchestrator: Arc<Orchestrator>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..concurrency)
        .map(|worker_id| {
            let client = client.clone();
            let orchestrator = orchestrator.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut redis = match ConnectionManager::new(client).await {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!(queue, worker_id, error = %e, "Worker could not connect to Redis");
                        return;
                    }
                };
                tracing::info!(queue, worker_id, "Worker started");
                loop {
                    if *shutdown.borrow() {
                        break;
                    }

                    let popped: Result<Option<(String, String)>, redis::RedisError> =
                        redis::cmd("BRPOP")
                            .arg(queue)
                            .arg(1.0)
                            .query_async(&mut redis)
                            .await;

                    match popped {
                        Ok(Some((_, payload))) => {
                            match serde_json::from_str::<Job>(&payload) {
                                Ok(job) => run_job(&orchestrator, job).await,
                                Err(e) => {
                                    tracing::error!(
                                        queue,
                                        error = %e,
                                        payload,
                                        "Dropping undecodable job"
                                    );
                                }
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(queue, error = %e, "Queue pop failed");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
                tracing::info!(queue, worker_id, "Worker stopped");
            })
        })
        .collect()
}

async fn run_job(orchestrator: &Orchestrator, job: Job) {
    let outcome = match job {
        Job::Single { notification_id } => orchestrator.process(notification_id).await,
        Job::Bulk { notification_id } => orchestrator.process_bulk(notification_id).await,
    };
    if let Err(e) = outcome {
        tracing::error!(error = %e, ?job, "Job processing failed");
    }
}

/// Periodically move due `Scheduled` notifications onto the single queue.
pub async fn run_scheduled_scanner(
    pool: PgPool,
    dispatcher: Dispatcher,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    tracing::info!(interval_secs = interval.as_secs(), "Scheduled-notification scanner started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = scan_scheduled(&pool, &dispatcher).await {
                    tracing::error!(error = %e, "Scheduled scan failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("Scheduled-notification scanner stopping");
                    return;
                }
            }
        }
    }
}

async fn scan_scheduled(pool: &PgPool, dispatcher: &Dispatcher) -> Result<(), AppError> {
    // Scheduled records whose expiry passed before they ever became due
    // never enter a queue.
    let expired = sqlx::query(
        r#"
        UPDATE notifications
        SET status = 'expired', completed_at = now()
        WHERE status = 'scheduled' AND expires_at IS NOT NULL AND expires_at <= now()
        "#,
    )
    .execute(pool)
    .await?;
    if expired.rows_affected() > 0 {
        tracing::info!(count = expired.rows_affected(), "Expired scheduled notifications");
    }

    let due: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        UPDATE notifications
        SET status = 'queued'
        WHERE status = 'scheduled' AND scheduled_at <= now()
        RETURNING id
        "#,
    )
    .fetch_all(pool)
    .await?;

    for (id,) in due {
        dispatcher.push_single(id).await?;
        tracing::info!(notification_id = %id, "Scheduled notification queued");
    }
    Ok(())
}

/// Periodically re-queue `Failed` notifications that are inside the 24 h
/// retry window and still have per-channel retry budget.
pub async fn run_retry_scanner(
    pool: PgPool,
    dispatcher: Dispatcher,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    tracing::info!(interval_secs = interval.as_secs(), "Retry scanner started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = scan_failed(&pool, &dispatcher).await {
                    tracing::error!(error = %e, "Retry scan failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("Retry scanner stopping");
                    return;
                }
            }
        }
    }
}

async fn scan_failed(pool: &PgPool, dispatcher: &Dispatcher) -> Result<(), AppError> {
    // Which (channel, recipient) pairs still have budget depends on the
    // recipient variants and the retryability of prior failures, so the
    // decision lives in `needs_retry` rather than SQL.
    let candidates: Vec<NotificationRecord> = sqlx::query_as(
        r#"
        SELECT * FROM notifications
        WHERE status = 'failed'
          AND completed_at >= now() - make_interval(hours => $1)
        "#,
    )
    .bind(RETRY_WINDOW_HOURS as i32)
    .fetch_all(pool)
    .await?;

    for record in candidates {
        let prior: Vec<DeliveryResult> = sqlx::query_as(
            "SELECT * FROM delivery_results WHERE notification_id = $1",
        )
        .bind(record.id)
        .fetch_all(pool)
        .await?;

        if !crate::orchestrator::needs_retry(&record, &prior) {
            continue;
        }

        // Guard against a concurrent worker racing us past 'failed'.
        let updated = sqlx::query(
            "UPDATE notifications SET status = 'queued' WHERE id = $1 AND status = 'failed'",
        )
        .bind(record.id)
        .execute(pool)
        .await?;
        if updated.rows_affected() == 0 {
            continue;
        }

        dispatcher.push_single(record.id).await?;
        tracing::info!(notification_id = %record.id, "Failed notification re-queued for retry");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_round_trip() {
        let id = Uuid::new_v4();
        let job = Job::Single {
            notification_id: id,
        };
        let encoded = serde_json::to_string(&job).unwrap();
        assert!(encoded.contains("single"));
        let decoded: Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_queues_are_distinct() {
        assert_ne!(SINGLE_QUEUE, BULK_QUEUE);
    }
}
