// Key-Value Store Port (shared, atomic per key)

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Shared store used for locks and counters.
///
/// Every operation must be atomic for a single key. Expired keys behave
/// exactly like absent keys. No multi-key transactions are required.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Increment an integer value (absent counts as 0), returning the new value.
    /// An existing expiry is kept.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Decrement an integer value (absent counts as 0), returning the new value.
    /// An existing expiry is kept.
    async fn decr(&self, key: &str) -> Result<i64>;

    /// Create `key` only if it is absent, expiring after `ttl`.
    /// Returns true iff this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// (Re)set the expiry of an existing key. Returns false if the key is absent.
    /// A zero ttl expires the key immediately.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Delete a key. Returns false if it was already absent.
    async fn delete(&self, key: &str) -> Result<bool>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use crate::port::TimeProvider;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Entry {
        value: String,
        expires_at: Option<i64>,
    }

    impl Entry {
        fn is_live(&self, now: i64) -> bool {
            self.expires_at.map_or(true, |at| at > now)
        }
    }

    /// Store operations, for targeted failure injection
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum StoreOp {
        Get,
        Incr,
        Decr,
        SetIfAbsent,
        Expire,
        Delete,
    }

    /// In-memory store with TTLs driven by an injected clock.
    ///
    /// Counts every operation so tests can assert that a code path never
    /// touched the store. Can be switched into a failing mode as a whole
    /// (`set_unavailable`) or per operation (`fail_on`).
    pub struct InMemoryKeyValueStore {
        entries: Mutex<HashMap<String, Entry>>,
        time_provider: Arc<dyn TimeProvider>,
        unavailable: AtomicBool,
        failing: Mutex<HashSet<StoreOp>>,
        operations: AtomicUsize,
    }

    impl InMemoryKeyValueStore {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
                time_provider,
                unavailable: AtomicBool::new(false),
                failing: Mutex::new(HashSet::new()),
                operations: AtomicUsize::new(0),
            }
        }

        /// Make every following operation fail with `StoreUnavailable`
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Make every following `op` fail with `StoreUnavailable`
        pub fn fail_on(&self, op: StoreOp) {
            self.failing.lock().unwrap().insert(op);
        }

        pub fn clear_failures(&self) {
            self.failing.lock().unwrap().clear();
        }

        /// Number of operations attempted so far
        pub fn operation_count(&self) -> usize {
            self.operations.load(Ordering::SeqCst)
        }

        /// Live (non-expired) keys, sorted
        pub fn keys(&self) -> Vec<String> {
            let now = self.time_provider.now_millis();
            let entries = self.entries.lock().unwrap();
            let mut keys: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.is_live(now))
                .map(|(key, _)| key.clone())
                .collect();
            keys.sort();
            keys
        }

        fn check(&self, op: StoreOp) -> Result<i64> {
            self.operations.fetch_add(1, Ordering::SeqCst);
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AppError::StoreUnavailable(
                    "in-memory store switched off".to_string(),
                ));
            }
            if self.failing.lock().unwrap().contains(&op) {
                return Err(AppError::StoreUnavailable(format!("{:?} failed", op)));
            }
            Ok(self.time_provider.now_millis())
        }

        fn add(&self, op: StoreOp, key: &str, delta: i64) -> Result<i64> {
            let now = self.check(op)?;
            let mut entries = self.entries.lock().unwrap();
            let (current, expires_at) = match entries.get(key) {
                Some(entry) if entry.is_live(now) => {
                    let current = entry.value.parse::<i64>().map_err(|_| {
                        AppError::StoreUnavailable(format!("value at {} is not an integer", key))
                    })?;
                    (current, entry.expires_at)
                }
                _ => (0, None),
            };
            let next = current + delta;
            entries.insert(
                key.to_string(),
                Entry {
                    value: next.to_string(),
                    expires_at,
                },
            );
            Ok(next)
        }
    }

    #[async_trait]
    impl KeyValueStore for InMemoryKeyValueStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            let now = self.check(StoreOp::Get)?;
            let entries = self.entries.lock().unwrap();
            Ok(entries
                .get(key)
                .filter(|entry| entry.is_live(now))
                .map(|entry| entry.value.clone()))
        }

        async fn incr(&self, key: &str) -> Result<i64> {
            self.add(StoreOp::Incr, key, 1)
        }

        async fn decr(&self, key: &str) -> Result<i64> {
            self.add(StoreOp::Decr, key, -1)
        }

        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
            let now = self.check(StoreOp::SetIfAbsent)?;
            let mut entries = self.entries.lock().unwrap();
            if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
                return Ok(false);
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Some(now + ttl.as_millis() as i64),
                },
            );
            Ok(true)
        }

        async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
            let now = self.check(StoreOp::Expire)?;
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(key) {
                Some(entry) if entry.is_live(now) => {
                    entry.expires_at = Some(now + ttl.as_millis() as i64);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn delete(&self, key: &str) -> Result<bool> {
            let now = self.check(StoreOp::Delete)?;
            let removed = self.entries.lock().unwrap().remove(key);
            Ok(removed.is_some_and(|entry| entry.is_live(now)))
        }
    }

}
