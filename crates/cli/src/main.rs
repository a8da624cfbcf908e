//! Gatekeeper CLI - inspect and administer queue throttling
//!
//! Talks to the shared SQLite store directly, using the same settings file
//! as the worker processes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{Table, Tabled};

use gatekeeper_core::application::{ThrottleStatus, Throttler};
use gatekeeper_core::domain::LimitConfig;
use gatekeeper_core::port::id_provider::UuidProvider;
use gatekeeper_core::port::time_provider::SystemTimeProvider;
use gatekeeper_core::settings::Settings;
use gatekeeper_infra_sqlite::{create_pool, run_migrations, SqliteJobQueue, SqliteKeyValueStore};

#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(about = "Gatekeeper queue throttling CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (TOML)
    #[arg(short, long, env = "GATEKEEPER_CONFIG", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a new job
    Enqueue {
        /// Queue name
        #[arg(short, long, default_value = "default")]
        queue: String,

        /// Payload as JSON string
        #[arg(long)]
        payload: String,
    },

    /// List configured limits
    Limits,

    /// Show throttling state per queue
    Status {
        /// Only this queue
        queue: Option<String>,
    },

    /// Clear lock and counters for one queue, or every limited queue
    Reset {
        queue: Option<String>,
    },

    /// Delete expired keys from the store
    Purge,
}

#[derive(Tabled)]
struct LimitRow {
    queue: String,
    throughput: String,
    concurrency: String,
}

#[derive(Tabled)]
struct StatusRow {
    queue: String,
    limit: String,
    locked: String,
    window_count: u64,
    active_jobs: u64,
    pending: i64,
}

fn describe_throughput(limit: &LimitConfig) -> String {
    format!(
        "{} / {}s",
        limit.throughput.count, limit.throughput.window_seconds
    )
}

fn describe_limit(limit: Option<&LimitConfig>) -> String {
    match limit {
        None => "-".to_string(),
        Some(limit) => match limit.concurrency {
            Some(concurrency) => format!(
                "{}, max {} running",
                describe_throughput(limit),
                concurrency.max
            ),
            None => describe_throughput(limit),
        },
    }
}

fn status_row(status: ThrottleStatus, pending: i64) -> StatusRow {
    let locked = if status.locked {
        "yes".yellow().to_string()
    } else {
        "no".to_string()
    };
    StatusRow {
        limit: describe_limit(status.limit.as_ref()),
        queue: status.queue,
        locked,
        window_count: status.throughput_count,
        active_jobs: status.active_jobs,
        pending,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let registry = Arc::new(
        settings
            .build_registry()
            .context("Invalid limit configuration")?,
    );

    let pool = create_pool(&settings.database_url)
        .await
        .context("Failed to open store")?;
    run_migrations(&pool).await.context("Migration failed")?;

    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let store = Arc::new(SqliteKeyValueStore::new(pool.clone(), time_provider.clone()));
    let job_queue = SqliteJobQueue::new(pool, time_provider, id_provider.clone());
    let throttler = Throttler::new(
        Arc::clone(&registry),
        store.clone(),
        settings.keys(),
        id_provider,
    )
    .with_lock_ttl(settings.lock_ttl());

    match cli.command {
        Commands::Enqueue { queue, payload } => {
            let payload_json: serde_json::Value =
                serde_json::from_str(&payload).context("Invalid JSON payload")?;

            let job = job_queue.enqueue(&queue, payload_json).await?;

            println!("{}", "✓ Job enqueued successfully".green().bold());
            println!("  {} {}", "Job ID:".bold(), job.id);
            println!("  {} {}", "Queue:".bold(), job.queue);
        }

        Commands::Limits => {
            let rows: Vec<LimitRow> = throttler
                .list_throttled_queues()
                .into_iter()
                .filter_map(|queue| {
                    registry.get_limit(&queue).map(|limit| LimitRow {
                        throughput: describe_throughput(limit),
                        concurrency: limit
                            .concurrency
                            .map(|c| c.max.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        queue,
                    })
                })
                .collect();

            if rows.is_empty() {
                println!("{}", "No queues are throttled".yellow());
            } else {
                println!("{}", Table::new(rows));
            }
        }

        Commands::Status { queue } => {
            let queues: BTreeSet<String> = match queue {
                Some(queue) => BTreeSet::from([queue]),
                None => settings
                    .queues
                    .iter()
                    .cloned()
                    .chain(throttler.list_throttled_queues())
                    .chain(job_queue.queue_names().await?)
                    .collect(),
            };

            let mut rows = Vec::with_capacity(queues.len());
            for queue in &queues {
                let status = throttler.status(queue).await?;
                let pending = job_queue.pending_count(queue).await?;
                rows.push(status_row(status, pending));
            }

            println!("{}", "Queue Status".cyan().bold());
            println!("{}", Table::new(rows));
        }

        Commands::Reset { queue } => {
            let reset = throttler.reset_throttling(queue.as_deref()).await?;
            if reset.is_empty() {
                println!("{}", "Nothing to reset".yellow());
            }
            for queue in reset {
                println!("{}", format!("✓ Throttling reset for {}", queue).green());
            }
        }

        Commands::Purge => {
            let purged = store.purge_expired().await?;
            println!("{} {} expired keys deleted", "✓".green(), purged);
        }
    }

    Ok(())
}
