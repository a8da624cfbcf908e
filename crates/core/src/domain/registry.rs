//! Limit Registry - per-queue limit configuration
//!
//! Built once at process start from static configuration and shared
//! read-only (`Arc<LimitRegistry>`) with the reservation path.

use super::error::Result;
use super::limit::{LimitConfig, LimitOptions};
use super::queue::{validate_queue_name, QueueId};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct LimitRegistry {
    limits: HashMap<QueueId, LimitConfig>,
}

impl LimitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the limits for `queue`
    ///
    /// Validation happens here, never on the reservation path. A failed call
    /// leaves any previous configuration for the queue untouched.
    pub fn set_limit(&mut self, queue: impl Into<String>, options: LimitOptions) -> Result<()> {
        let queue = queue.into();
        validate_queue_name(&queue)?;
        let config = options.into_config(&queue)?;
        self.limits.insert(queue, config);
        Ok(())
    }

    /// Register limits from a JSON object such as `{"count": 1, "window_seconds": 60}`
    pub fn set_limit_value(
        &mut self,
        queue: impl Into<String>,
        options: serde_json::Value,
    ) -> Result<()> {
        let options = LimitOptions::from_value(options)?;
        self.set_limit(queue, options)
    }

    pub fn get_limit(&self, queue: &str) -> Option<&LimitConfig> {
        self.limits.get(queue)
    }

    pub fn is_throttled(&self, queue: &str) -> bool {
        self.limits.contains_key(queue)
    }

    pub fn has_concurrency_limit(&self, queue: &str) -> bool {
        self.limits
            .get(queue)
            .is_some_and(|config| config.concurrency.is_some())
    }

    /// Throttled queue names, sorted
    pub fn list_throttled_queues(&self) -> BTreeSet<QueueId> {
        self.limits.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}
