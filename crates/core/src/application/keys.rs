//! Store key naming
//!
//! `<prefix>:<purpose>:<queue>`, e.g. `throttle:rate_limit:emails`, with an
//! optional deployment namespace in front (`app1:throttle:lock:emails`).
//! Existing deployments and dashboards depend on these names.

use super::worker::constants::{ACTIVE_JOBS_PURPOSE, KEY_PREFIX, LOCK_PURPOSE, RATE_LIMIT_PURPOSE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleKeys {
    base: String,
}

impl ThrottleKeys {
    pub fn new(namespace: Option<&str>) -> Self {
        let base = match namespace.map(str::trim) {
            Some(ns) if !ns.is_empty() => format!("{}:{}", ns, KEY_PREFIX),
            _ => KEY_PREFIX.to_string(),
        };
        Self { base }
    }

    pub fn lock(&self, queue: &str) -> String {
        self.key(LOCK_PURPOSE, queue)
    }

    pub fn rate_limit(&self, queue: &str) -> String {
        self.key(RATE_LIMIT_PURPOSE, queue)
    }

    pub fn active_jobs(&self, queue: &str) -> String {
        self.key(ACTIVE_JOBS_PURPOSE, queue)
    }

    fn key(&self, purpose: &str, queue: &str) -> String {
        format!("{}:{}:{}", self.base, purpose, queue)
    }
}

impl Default for ThrottleKeys {
    fn default() -> Self {
        Self::new(None)
    }
}
