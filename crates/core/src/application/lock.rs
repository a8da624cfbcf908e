//! Distributed Lock - per-queue reservation lock held in the shared store
//!
//! Serializes the check-then-record sequence of a reservation attempt
//! across workers. It is not a job-execution lock: it is held only for the
//! duration of one attempt. Acquisition never waits.

use super::keys::ThrottleKeys;
use super::worker::constants::LOCK_TTL;
use crate::error::Result;
use crate::port::{IdProvider, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    keys: Arc<ThrottleKeys>,
    id_provider: Arc<dyn IdProvider>,
    ttl: Duration,
}

impl DistributedLock {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        keys: Arc<ThrottleKeys>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            store,
            keys,
            id_provider,
            ttl: LOCK_TTL,
        }
    }

    /// Override the lock expiry (tests, unusual deployments)
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Try to take the lock for `queue`. Returns false if someone else holds it.
    ///
    /// The stored value is a fresh holder token, useful only for inspection.
    pub async fn try_acquire(&self, queue: &str) -> Result<bool> {
        let key = self.keys.lock(queue);
        let token = self.id_provider.generate_id();
        let acquired = self.store.set_if_absent(&key, &token, self.ttl).await?;

        debug!(queue = %queue, key = %key, token = %token, acquired, "Lock attempt");
        Ok(acquired)
    }

    /// Release the lock for `queue`.
    ///
    /// Unconditional delete; releasing an already expired lock is a no-op.
    pub async fn release(&self, queue: &str) -> Result<()> {
        let key = self.keys.lock(queue);
        let existed = self.store.delete(&key).await?;
        if !existed {
            debug!(queue = %queue, key = %key, "Lock already gone at release (expired)");
        }
        Ok(())
    }

    /// Current holder token, if the lock is held
    pub async fn holder(&self, queue: &str) -> Result<Option<String>> {
        self.store.get(&self.keys.lock(queue)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::key_value_store::mocks::InMemoryKeyValueStore;
    use crate::port::time_provider::mocks::ManualClock;

    fn setup() -> (Arc<ManualClock>, Arc<InMemoryKeyValueStore>, DistributedLock) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(InMemoryKeyValueStore::new(clock.clone()));
        let lock = DistributedLock::new(
            store.clone(),
            Arc::new(ThrottleKeys::default()),
            Arc::new(SequentialIdProvider::new("holder")),
        );
        (clock, store, lock)
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let (_, _, lock) = setup();

        assert!(lock.try_acquire("q1").await.unwrap());
        assert!(!lock.try_acquire("q1").await.unwrap());

        lock.release("q1").await.unwrap();
        assert!(lock.try_acquire("q1").await.unwrap());
    }

    #[tokio::test]
    async fn test_locks_are_per_queue() {
        let (_, _, lock) = setup();
        assert!(lock.try_acquire("q1").await.unwrap());
        assert!(lock.try_acquire("q2").await.unwrap());
    }

    #[tokio::test]
    async fn test_crashed_holder_lock_expires() {
        let (clock, _, lock) = setup();
        assert!(lock.try_acquire("q1").await.unwrap());

        clock.advance(LOCK_TTL - Duration::from_millis(1));
        assert!(!lock.try_acquire("q1").await.unwrap());

        clock.advance(Duration::from_millis(1));
        assert!(lock.try_acquire("q1").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_of_absent_lock_is_noop() {
        let (clock, _, lock) = setup();
        lock.release("never-held").await.unwrap();

        assert!(lock.try_acquire("q1").await.unwrap());
        clock.advance(LOCK_TTL);
        lock.release("q1").await.unwrap();
    }

    #[tokio::test]
    async fn test_holder_token_is_stored() {
        let (_, store, lock) = setup();
        assert!(lock.try_acquire("q1").await.unwrap());
        assert_eq!(lock.holder("q1").await.unwrap().as_deref(), Some("holder-1"));
        assert_eq!(store.keys(), vec!["throttle:lock:q1".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_has_single_winner() {
        let (_, _, lock) = setup();
        let lock = Arc::new(lock);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let lock = Arc::clone(&lock);
            handles.push(tokio::spawn(async move { lock.try_acquire("q1").await.unwrap() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
