//! Throttler - the limit registry plus its store-backed lock and counters
//!
//! Also the administrative surface: limit lookups, status snapshots and
//! resetting a queue's throttling state.

use super::concurrency::ConcurrencyCounter;
use super::keys::ThrottleKeys;
use super::lock::DistributedLock;
use super::throughput::ThroughputCounter;
use crate::domain::{LimitConfig, LimitRegistry, QueueId};
use crate::error::Result;
use crate::port::{IdProvider, KeyValueStore};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Point-in-time view of one queue's throttling state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThrottleStatus {
    pub queue: QueueId,
    pub limit: Option<LimitConfig>,
    pub locked: bool,
    pub throughput_count: u64,
    pub active_jobs: u64,
}

pub struct Throttler {
    registry: Arc<LimitRegistry>,
    lock: DistributedLock,
    throughput: ThroughputCounter,
    concurrency: ConcurrencyCounter,
}

impl Throttler {
    pub fn new(
        registry: Arc<LimitRegistry>,
        store: Arc<dyn KeyValueStore>,
        keys: ThrottleKeys,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        let keys = Arc::new(keys);
        Self {
            lock: DistributedLock::new(Arc::clone(&store), Arc::clone(&keys), id_provider),
            throughput: ThroughputCounter::new(
                Arc::clone(&store),
                Arc::clone(&keys),
                Arc::clone(&registry),
            ),
            concurrency: ConcurrencyCounter::new(store, keys, Arc::clone(&registry)),
            registry,
        }
    }

    /// Override the reservation lock expiry
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock = self.lock.with_ttl(ttl);
        self
    }

    pub fn registry(&self) -> &LimitRegistry {
        &self.registry
    }

    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    pub fn throughput(&self) -> &ThroughputCounter {
        &self.throughput
    }

    pub fn concurrency(&self) -> &ConcurrencyCounter {
        &self.concurrency
    }

    pub fn get_limit(&self, queue: &str) -> Option<&LimitConfig> {
        self.registry.get_limit(queue)
    }

    pub fn is_throttled(&self, queue: &str) -> bool {
        self.registry.is_throttled(queue)
    }

    pub fn list_throttled_queues(&self) -> BTreeSet<QueueId> {
        self.registry.list_throttled_queues()
    }

    /// Clear lock, throughput counter and in-flight counter.
    ///
    /// `Some(queue)` resets that queue (registered or not); `None` resets
    /// every registered queue. Returns the queues that were reset.
    pub async fn reset_throttling(&self, queue: Option<&str>) -> Result<Vec<QueueId>> {
        let queues: Vec<QueueId> = match queue {
            Some(queue) => vec![queue.to_string()],
            None => self.registry.list_throttled_queues().into_iter().collect(),
        };

        for queue in &queues {
            self.lock.release(queue).await?;
            self.throughput.reset(queue).await?;
            self.concurrency.reset(queue).await?;
            info!(queue = %queue, "Throttling state reset");
        }

        Ok(queues)
    }

    pub async fn status(&self, queue: &str) -> Result<ThrottleStatus> {
        Ok(ThrottleStatus {
            queue: queue.to_string(),
            limit: self.registry.get_limit(queue).copied(),
            locked: self.lock.holder(queue).await?.is_some(),
            throughput_count: self.throughput.current_count(queue).await?,
            active_jobs: self.concurrency.active_count(queue).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LimitOptions;
    use crate::port::id_provider::UuidProvider;
    use crate::port::key_value_store::mocks::InMemoryKeyValueStore;
    use crate::port::time_provider::mocks::ManualClock;

    fn setup() -> (Arc<InMemoryKeyValueStore>, Throttler) {
        let mut registry = LimitRegistry::new();
        registry
            .set_limit("q1", LimitOptions::throughput(1, 60))
            .unwrap();
        registry
            .set_limit("q2", LimitOptions::throughput(5, 5).with_concurrency(2))
            .unwrap();

        let store = Arc::new(InMemoryKeyValueStore::new(Arc::new(ManualClock::default())));
        let throttler = Throttler::new(
            Arc::new(registry),
            store.clone(),
            ThrottleKeys::default(),
            Arc::new(UuidProvider),
        );
        (store, throttler)
    }

    async fn dirty(throttler: &Throttler, queue: &str) {
        assert!(throttler.lock().try_acquire(queue).await.unwrap());
        throttler.throughput().record_start(queue).await.unwrap();
        throttler.concurrency().on_job_start(queue).await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_single_queue() {
        let (_, throttler) = setup();
        dirty(&throttler, "q1").await;
        dirty(&throttler, "q2").await;

        let reset = throttler.reset_throttling(Some("q1")).await.unwrap();
        assert_eq!(reset, vec!["q1".to_string()]);

        let q1 = throttler.status("q1").await.unwrap();
        assert!(!q1.locked);
        assert_eq!(q1.throughput_count, 0);
        assert_eq!(q1.active_jobs, 0);

        let q2 = throttler.status("q2").await.unwrap();
        assert!(q2.locked);
        assert_eq!(q2.throughput_count, 1);
        assert_eq!(q2.active_jobs, 1);
    }

    #[tokio::test]
    async fn test_reset_all_registered_queues() {
        let (store, throttler) = setup();
        dirty(&throttler, "q1").await;
        dirty(&throttler, "q2").await;

        let reset = throttler.reset_throttling(None).await.unwrap();
        assert_eq!(reset, vec!["q1".to_string(), "q2".to_string()]);
        assert!(store.keys().is_empty());
        assert!(throttler.lock().try_acquire("q1").await.unwrap());
    }

    #[tokio::test]
    async fn test_status_of_unthrottled_queue() {
        let (_, throttler) = setup();
        let status = throttler.status("q3").await.unwrap();
        assert_eq!(status.limit, None);
        assert!(!status.locked);
        assert!(!throttler.is_throttled("q3"));
    }

    #[tokio::test]
    async fn test_lock_ttl_override() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryKeyValueStore::new(clock.clone()));
        let throttler = Throttler::new(
            Arc::new(LimitRegistry::new()),
            store,
            ThrottleKeys::default(),
            Arc::new(UuidProvider),
        )
        .with_lock_ttl(Duration::from_secs(5));

        assert!(throttler.lock().try_acquire("q1").await.unwrap());
        clock.advance(Duration::from_secs(4));
        assert!(!throttler.lock().try_acquire("q1").await.unwrap());
        clock.advance(Duration::from_secs(1));
        assert!(throttler.lock().try_acquire("q1").await.unwrap());
    }

    #[tokio::test]
    async fn test_admin_lookups() {
        let (_, throttler) = setup();
        assert_eq!(throttler.get_limit("q1").unwrap().throughput.window_seconds, 60);
        assert_eq!(throttler.list_throttled_queues().len(), 2);
    }
}
