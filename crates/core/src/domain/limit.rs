//! Limit configuration for a single queue.
//!
//! A queue is either unthrottled (no entry in the registry) or carries a
//! throughput limit plus an optional concurrency limit.

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// At most `count` job starts recorded within a `window_seconds` window.
///
/// The window restarts on every recorded start (fixed window with a
/// refreshed expiry), so bursts around a window boundary can exceed the
/// nominal rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputLimit {
    pub count: u64,
    pub window_seconds: u64,
}

impl ThroughputLimit {
    pub fn new(count: u64, window_seconds: u64) -> Result<Self> {
        if count == 0 {
            return Err(DomainError::InvalidCount(0));
        }
        Ok(Self {
            count,
            window_seconds,
        })
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// At most `max` jobs executing at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyLimit {
    pub max: u64,
}

impl ConcurrencyLimit {
    pub fn new(max: u64) -> Result<Self> {
        if max == 0 {
            return Err(DomainError::InvalidConcurrency(0));
        }
        Ok(Self { max })
    }
}

/// Validated limit configuration for one queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub throughput: ThroughputLimit,
    pub concurrency: Option<ConcurrencyLimit>,
}

/// Option keys accepted by `LimitOptions::from_value`
pub const KNOWN_OPTIONS: [&str; 4] = ["count", "window_seconds", "windowSeconds", "concurrent"];

/// Raw limit options as an operator writes them:
/// `{ count = 5, window_seconds = 5, concurrent = 2 }`
///
/// Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitOptions {
    #[serde(default)]
    pub count: Option<i64>,

    #[serde(default, alias = "windowSeconds")]
    pub window_seconds: Option<i64>,

    #[serde(default)]
    pub concurrent: Option<i64>,
}

impl LimitOptions {
    pub fn throughput(count: i64, window_seconds: i64) -> Self {
        Self {
            count: Some(count),
            window_seconds: Some(window_seconds),
            concurrent: None,
        }
    }

    pub fn with_concurrency(mut self, max: i64) -> Self {
        self.concurrent = Some(max);
        self
    }

    /// Parse options from a JSON object.
    ///
    /// Keys are checked against `KNOWN_OPTIONS` first, so an unknown key is
    /// always reported as `UnknownOption` before any value is looked at.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let map = match value {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(DomainError::Malformed(format!(
                    "limit options must be an object, got {}",
                    other
                )))
            }
        };
        if let Some(key) = map.keys().find(|key| !KNOWN_OPTIONS.contains(&key.as_str())) {
            return Err(DomainError::UnknownOption(key.clone()));
        }
        serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| DomainError::Malformed(e.to_string()))
    }

    /// Validate into a `LimitConfig` for `queue`
    pub fn into_config(self, queue: &str) -> Result<LimitConfig> {
        let count = self
            .count
            .ok_or_else(|| DomainError::MissingThroughput(queue.to_string()))?;
        let window = self.window_seconds.ok_or_else(|| {
            DomainError::Malformed(format!("window_seconds is required for queue '{}'", queue))
        })?;

        if count <= 0 {
            return Err(DomainError::InvalidCount(count));
        }
        if window < 0 {
            return Err(DomainError::InvalidWindow(window));
        }

        let concurrency = match self.concurrent {
            Some(max) if max <= 0 => return Err(DomainError::InvalidConcurrency(max)),
            Some(max) => Some(ConcurrencyLimit { max: max as u64 }),
            None => None,
        };

        Ok(LimitConfig {
            throughput: ThroughputLimit {
                count: count as u64,
                window_seconds: window as u64,
            },
            concurrency,
        })
    }
}
