//! Process settings
//!
//! Loaded with the `config` crate: an optional TOML file layered with
//! `GATEKEEPER_*` environment variables (`__` separates nested keys).
//!
//! ```toml
//! database_url = "sqlite:///var/lib/gatekeeper/state.db"
//! queues = ["critical", "emails", "default"]
//! workers = 4
//!
//! [[limits]]
//! queue = "emails"
//! count = 100
//! window_seconds = 60
//! concurrent = 5
//! ```
//!
//! Every worker process must run with the same limits; nothing shares them.

use crate::application::ThrottleKeys;
use crate::application::worker::constants::{LOCK_TTL, SHUTDOWN_GRACE_DURATION};
use crate::domain::{DomainError, LimitOptions, LimitRegistry, QueueId};
use crate::error::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://gatekeeper.db";
pub const DEFAULT_SETTINGS_FILE: &str = "gatekeeper.toml";
pub const ENV_PREFIX: &str = "GATEKEEPER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Optional namespace prepended to every store key
    #[serde(default)]
    pub namespace: Option<String>,

    /// Queues to poll, highest priority first
    #[serde(default = "default_queues")]
    pub queues: Vec<QueueId>,

    /// Worker tasks per process
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Reservation lock expiry; bounds how long a crashed holder blocks a queue
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Per-job timeout when the payload does not set one
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Time a running job gets to finish after shutdown before it is aborted
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    #[serde(default)]
    pub limits: Vec<LimitEntry>,
}

/// One `[[limits]]` table: the queue name plus raw limit options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitEntry {
    pub queue: QueueId,

    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl LimitEntry {
    pub fn options(&self) -> crate::domain::error::Result<LimitOptions> {
        LimitOptions::from_value(serde_json::Value::Object(self.options.clone()))
    }
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_queues() -> Vec<QueueId> {
    vec!["default".to_string()]
}

fn default_workers() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_lock_ttl_secs() -> u64 {
    LOCK_TTL.as_secs()
}

fn default_job_timeout_secs() -> u64 {
    600
}

fn default_shutdown_grace_secs() -> u64 {
    SHUTDOWN_GRACE_DURATION.as_secs()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            namespace: None,
            queues: default_queues(),
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            job_timeout_secs: default_job_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            limits: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (required) or `gatekeeper.toml` (optional),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::with_name(DEFAULT_SETTINGS_FILE)
                .format(FileFormat::Toml)
                .required(false),
        };
        let builder = Config::builder().add_source(file).add_source(env_source());
        Self::build(builder)
    }

    /// Parse settings from TOML text, without environment overrides
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings: Settings = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| DomainError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.queues.is_empty() {
            return Err(DomainError::InvalidSettings("queues must not be empty".to_string()).into());
        }
        if self.workers == 0 {
            return Err(DomainError::InvalidSettings("workers must be at least 1".to_string()).into());
        }
        if self.lock_ttl_secs == 0 {
            return Err(DomainError::InvalidSettings("lock_ttl_secs must be at least 1".to_string()).into());
        }
        Ok(())
    }

    /// Build the limit registry; any invalid entry fails the whole load
    pub fn build_registry(&self) -> Result<LimitRegistry> {
        let mut registry = LimitRegistry::new();
        for entry in &self.limits {
            registry.set_limit(entry.queue.clone(), entry.options()?)?;
        }
        Ok(registry)
    }

    pub fn keys(&self) -> ThrottleKeys {
        ThrottleKeys::new(self.namespace.as_deref())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("queues")
}
