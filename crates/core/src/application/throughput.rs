//! Throughput Counter - job starts recorded in the current window
//!
//! Fixed-window approximation: every recorded start re-arms the key's
//! expiry to the full window, so the count only drops back to zero once a
//! whole window passes without a start. Bursts straddling a window boundary
//! can exceed the nominal rate.

use super::keys::ThrottleKeys;
use crate::domain::LimitRegistry;
use crate::error::{AppError, Result};
use crate::port::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ThroughputCounter {
    store: Arc<dyn KeyValueStore>,
    keys: Arc<ThrottleKeys>,
    registry: Arc<LimitRegistry>,
}

impl ThroughputCounter {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        keys: Arc<ThrottleKeys>,
        registry: Arc<LimitRegistry>,
    ) -> Self {
        Self {
            store,
            keys,
            registry,
        }
    }

    /// Starts recorded in the current window (absent key = 0)
    pub async fn current_count(&self, queue: &str) -> Result<u64> {
        read_counter(self.store.as_ref(), &self.keys.rate_limit(queue)).await
    }

    /// True when the window already holds `count` starts.
    /// Unthrottled queues are never over limit and cost no store round-trip.
    pub async fn is_over_limit(&self, queue: &str) -> Result<bool> {
        let Some(config) = self.registry.get_limit(queue) else {
            return Ok(false);
        };
        let current = self.current_count(queue).await?;
        Ok(current >= config.throughput.count)
    }

    /// Record one job start and re-arm the window.
    ///
    /// Call only under the queue's lock, after the limit check passed and a
    /// job was actually dequeued.
    pub async fn record_start(&self, queue: &str) -> Result<()> {
        let Some(config) = self.registry.get_limit(queue) else {
            warn!(queue = %queue, "record_start on an unthrottled queue ignored");
            return Ok(());
        };

        let key = self.keys.rate_limit(queue);
        let count = self.store.incr(&key).await?;
        self.store.expire(&key, config.throughput.window()).await?;

        debug!(
            queue = %queue,
            count,
            limit = config.throughput.count,
            window_seconds = config.throughput.window_seconds,
            "Recorded job start"
        );
        Ok(())
    }

    pub async fn reset(&self, queue: &str) -> Result<()> {
        self.store.delete(&self.keys.rate_limit(queue)).await?;
        Ok(())
    }
}

/// Read an integer counter, treating absent and negative values as zero
pub(super) async fn read_counter(store: &dyn KeyValueStore, key: &str) -> Result<u64> {
    match store.get(key).await? {
        None => Ok(0),
        Some(raw) => {
            let value = raw.trim().parse::<i64>().map_err(|_| {
                AppError::StoreUnavailable(format!("counter {} holds non-integer '{}'", key, raw))
            })?;
            Ok(value.max(0) as u64)
        }
    }
}
