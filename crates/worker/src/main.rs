use std::sync::Arc;
use std::time::Duration;

use courier_channels::ChannelRouter;
use courier_common::config::AppConfig;
use courier_common::{db, redis_pool};
use courier_engine::scheduler::{self, BULK_QUEUE, SINGLE_QUEUE};
use courier_engine::{Dispatcher, Orchestrator, PreferenceResolver};
use courier_guard::{IdempotencyGuard, RateLimiter, RuleStore};
use courier_templates::TemplateStore;
use courier_webhooks::WebhookDeliveryEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_worker=info,courier_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("Courier worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database and Redis
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    let redis_client = redis_pool::create_client(&config.redis_url)?;
    let redis = redis_pool::create_redis_pool(&config.redis_url).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Rate-limit rules: built-in defaults, overridden by any persisted rows
    let rules = RuleStore::with_defaults();
    let loaded = rules.reload(&pool).await?;
    tracing::info!(loaded, "Rate-limit rules loaded");

    let guard = IdempotencyGuard::new(config.idempotency_ttl_secs, config.dedup_window_secs);
    let limiter = RateLimiter::new(rules);
    let router = Arc::new(ChannelRouter::from_config(&config, pool.clone()));
    let templates = TemplateStore::new(pool.clone());
    let preferences = PreferenceResolver::new(pool.clone());
    let dispatcher = Dispatcher::new(redis.clone());

    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        redis.clone(),
        guard,
        limiter,
        router,
        templates,
        preferences,
        dispatcher.clone(),
        config.bulk_batch_size,
        Duration::from_millis(config.bulk_batch_stagger_ms),
    ));

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.provider_timeout_secs))
        .build()?;
    let webhooks = Arc::new(WebhookDeliveryEngine::new(pool.clone(), http_client));

    // All long-running tasks observe the same shutdown signal and drain
    // their job in hand before exiting.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut handles = scheduler::spawn_workers(
        SINGLE_QUEUE,
        config.single_concurrency,
        redis_client.clone(),
        orchestrator.clone(),
        shutdown_rx.clone(),
    );
    handles.extend(scheduler::spawn_workers(
        BULK_QUEUE,
        config.bulk_concurrency,
        redis_client,
        orchestrator.clone(),
        shutdown_rx.clone(),
    ));

    handles.push(tokio::spawn(scheduler::run_scheduled_scanner(
        pool.clone(),
        dispatcher.clone(),
        Duration::from_secs(config.scheduled_scan_interval_secs),
        shutdown_rx.clone(),
    )));
    handles.push(tokio::spawn(scheduler::run_retry_scanner(
        pool.clone(),
        dispatcher.clone(),
        Duration::from_secs(config.retry_scan_interval_secs),
        shutdown_rx.clone(),
    )));
    {
        let webhooks = webhooks.clone();
        let interval = Duration::from_secs(config.webhook_scan_interval_secs);
        let shutdown_rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            webhooks.run_scanner(interval, shutdown_rx).await;
        }));
    }

    tracing::info!(
        single_workers = config.single_concurrency,
        bulk_workers = config.bulk_concurrency,
        "Courier worker running"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping gracefully...");
    shutdown_tx.send(true)?;

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Task panicked during shutdown");
        }
    }

    tracing::info!("Courier worker stopped.");
    Ok(())
}
