//! Concurrency Counter - jobs currently executing per queue
//!
//! Incremented when a reserved job starts executing, decremented when it
//! ends. The decrement is clamped at zero. A worker dying mid-job leaves the
//! counter inflated until an operator resets the queue.

use super::keys::ThrottleKeys;
use super::throughput::read_counter;
use crate::domain::LimitRegistry;
use crate::error::Result;
use crate::port::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ConcurrencyCounter {
    store: Arc<dyn KeyValueStore>,
    keys: Arc<ThrottleKeys>,
    registry: Arc<LimitRegistry>,
}

impl ConcurrencyCounter {
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

    pub async fn active_count(&self, queue: &str) -> Result<u64> {
        read_counter(self.store.as_ref(), &self.keys.active_jobs(queue)).await
    }

    /// False without a concurrency limit, otherwise `active >= max`
    pub async fn is_over_limit(&self, queue: &str) -> Result<bool> {
        let Some(limit) = self
            .registry
            .get_limit(queue)
            .and_then(|config| config.concurrency)
        else {
            return Ok(false);
        };
        let active = self.active_count(queue).await?;
        Ok(active >= limit.max)
    }

    /// A job of `queue` began executing. Returns the new in-flight count.
    pub async fn on_job_start(&self, queue: &str) -> Result<u64> {
        let active = self.store.incr(&self.keys.active_jobs(queue)).await?;
        debug!(queue = %queue, active, "Job started");
        Ok(active.max(0) as u64)
    }

    /// A job of `queue` finished (any outcome). Returns the new in-flight count.
    ///
    /// An underflow is undone with a compensating increment rather than an
    /// overwrite, so a start recorded by another worker in between survives.
    /// Readers treat the transient negative value as zero.
    pub async fn on_job_end(&self, queue: &str) -> Result<u64> {
        let key = self.keys.active_jobs(queue);
        let active = self.store.decr(&key).await?;
        if active < 0 {
            warn!(queue = %queue, active, "In-flight counter underflow, clamping to zero");
            let restored = self.store.incr(&key).await?;
            return Ok(restored.max(0) as u64);
        }
        debug!(queue = %queue, active, "Job ended");
        Ok(active as u64)
    }

    pub async fn reset(&self, queue: &str) -> Result<()> {
        self.store.delete(&self.keys.active_jobs(queue)).await?;
        Ok(())
    }
}
