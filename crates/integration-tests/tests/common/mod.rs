//! Shared fixtures: several "processes" sharing one SQLite database file
#![allow(dead_code)]

use gatekeeper_core::application::{ReservationCoordinator, ThrottleKeys, Throttler};
use gatekeeper_core::domain::{LimitOptions, LimitRegistry};
use gatekeeper_core::port::id_provider::UuidProvider;
use gatekeeper_core::port::TimeProvider;
use gatekeeper_infra_sqlite::{create_pool, run_migrations, SqliteJobQueue, SqliteKeyValueStore};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

/// The limits used across scenarios:
/// q1 admits one job per minute, q2 five per five seconds with at most two
/// running, q3 is unthrottled.
pub fn scenario_registry() -> Arc<LimitRegistry> {
    let mut registry = LimitRegistry::new();
    registry
        .set_limit("q1", LimitOptions::throughput(1, 60))
        .unwrap();
    registry
        .set_limit("q2", LimitOptions::throughput(5, 5).with_concurrency(2))
        .unwrap();
    Arc::new(registry)
}

pub struct SharedDatabase {
    // Dropped last; removes the database file
    _dir: TempDir,
    url: String,
}

impl SharedDatabase {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("state.db").display());

        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool.close().await;

        Self { _dir: dir, url }
    }

    /// Open an independent connection pool, as a separate worker process would
    pub async fn process(
        &self,
        registry: Arc<LimitRegistry>,
        clock: Arc<dyn TimeProvider>,
    ) -> Process {
        let pool = create_pool(&self.url).await.unwrap();
        let store = Arc::new(SqliteKeyValueStore::new(pool.clone(), clock.clone()));
        let queue = Arc::new(SqliteJobQueue::new(
            pool.clone(),
            clock,
            Arc::new(UuidProvider),
        ));
        let throttler = Arc::new(Throttler::new(
            registry,
            store.clone(),
            ThrottleKeys::default(),
            Arc::new(UuidProvider),
        ));
        let coordinator = Arc::new(ReservationCoordinator::new(
            throttler.clone(),
            queue.clone(),
        ));

        Process {
            pool,
            store,
            queue,
            throttler,
            coordinator,
        }
    }
}

pub struct Process {
    pub pool: SqlitePool,
    pub store: Arc<SqliteKeyValueStore>,
    pub queue: Arc<SqliteJobQueue>,
    pub throttler: Arc<Throttler>,
    pub coordinator: Arc<ReservationCoordinator>,
}

impl Process {
    pub async fn enqueue_many(&self, queue: &str, count: usize) {
        for i in 0..count {
            self.queue
                .enqueue(queue, serde_json::json!({ "n": i }))
                .await
                .unwrap();
        }
    }

    pub fn queues(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }
}
