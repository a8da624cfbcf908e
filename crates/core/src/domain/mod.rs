// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod limit;
pub mod queue;
pub mod registry;

// Re-exports
pub use error::DomainError;
pub use job::{Job, JobId, JobPayload};
pub use limit::{ConcurrencyLimit, LimitConfig, LimitOptions, ThroughputLimit};
pub use queue::QueueId;
pub use registry::LimitRegistry;
