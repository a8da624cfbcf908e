//! Gatekeeper Worker - Main Entry Point
//! Polls the configured queues through the throttling coordinator and runs jobs.

mod handler;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gatekeeper_core::application::{
    shutdown_channel, ReservationCoordinator, ShutdownToken, Throttler, Worker,
};
use gatekeeper_core::port::id_provider::UuidProvider;
use gatekeeper_core::port::time_provider::SystemTimeProvider;
use gatekeeper_core::settings::Settings;
use gatekeeper_infra_sqlite::{create_pool, run_migrations, SqliteJobQueue, SqliteKeyValueStore};
use handler::CommandJobHandler;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "gatekeeper-worker", version, about = "Gatekeeper worker process")]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long, env = "GATEKEEPER_CONFIG")]
    config: Option<PathBuf>,
}

fn init_logging() -> Result<()> {
    let log_format =
        std::env::var("GATEKEEPER_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("gatekeeper=info"))
        .context("Failed to create env filter")?;

    let telemetry = telemetry::telemetry_layer()?;

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(telemetry)
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(telemetry)
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Logging (+ optional OpenTelemetry)
    init_logging()?;
    info!("Gatekeeper worker v{} starting...", VERSION);

    // 2. Settings; a bad limit fails start-up before any job is touched
    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    let registry = settings
        .build_registry()
        .context("Invalid limit configuration")?;

    info!(
        database_url = %settings.database_url,
        queues = ?settings.queues,
        workers = settings.workers,
        lock_ttl_secs = settings.lock_ttl_secs,
        shutdown_grace_secs = settings.shutdown_grace_secs,
        throttled = ?registry.list_throttled_queues(),
        "Settings loaded"
    );

    // 3. Shared store
    let pool = create_pool(&settings.database_url)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 4. DI wiring
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let store = Arc::new(SqliteKeyValueStore::new(pool.clone(), time_provider.clone()));
    let job_queue = Arc::new(SqliteJobQueue::new(
        pool.clone(),
        time_provider.clone(),
        id_provider.clone(),
    ));

    let throttler = Arc::new(Throttler::new(
        Arc::new(registry),
        store.clone(),
        settings.keys(),
        id_provider,
    )
    .with_lock_ttl(settings.lock_ttl()));
    let coordinator = Arc::new(ReservationCoordinator::new(throttler, job_queue));
    let handler = Arc::new(
        CommandJobHandler::new(vec![
            "PATH".to_string(),
            "HOME".to_string(),
            "USER".to_string(),
        ])
        .with_default_timeout(settings.job_timeout()),
    );

    // 5. Workers
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut worker_handles = Vec::with_capacity(settings.workers);
    for index in 0..settings.workers {
        let worker = Worker::new(
            format!("worker-{}", index),
            settings.queues.clone(),
            coordinator.clone(),
            handler.clone(),
        )
        .with_idle_sleep(settings.poll_interval())
        .with_shutdown_grace(settings.shutdown_grace());
        let token = shutdown_rx.clone();

        worker_handles.push(tokio::spawn(async move {
            if let Err(e) = worker.run(token).await {
                error!(worker = %worker.name(), error = ?e, "Worker failed");
            }
        }));
    }

    // 6. Expired-key sweep
    let sweeper = tokio::spawn(run_sweeper(
        store,
        settings.sweep_interval(),
        shutdown_rx,
    ));

    info!("System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // Each worker aborts its running job once the grace period is over and
    // still clears the in-flight mark, so this join is bounded.
    shutdown_tx.shutdown();
    for joined in futures::future::join_all(worker_handles).await {
        if let Err(e) = joined {
            error!(error = ?e, "Worker task ended abnormally");
        }
    }
    let _ = sweeper.await;

    info!("Shutdown complete.");
    Ok(())
}

/// Periodically drop expired rows so the store does not grow without bound
async fn run_sweeper(
    store: Arc<SqliteKeyValueStore>,
    interval: Duration,
    mut shutdown: ShutdownToken,
) {
    loop {
        if shutdown.sleep(interval).await {
            break;
        }
        match store.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "Purged expired keys"),
            Err(e) => warn!(error = %e, "Expired key sweep failed"),
        }
    }
}
