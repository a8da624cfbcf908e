// Domain Error Types

use thiserror::Error;

/// Limit configuration errors, raised when a limit is registered
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Queue name must not be empty")]
    EmptyQueueName,

    #[error("Throughput limit is required for queue '{0}'")]
    MissingThroughput(String),

    #[error("Throughput count must be positive, got {0}")]
    InvalidCount(i64),

    #[error("Throughput window must be non-negative, got {0} seconds")]
    InvalidWindow(i64),

    #[error("Concurrency limit must be positive, got {0}")]
    InvalidConcurrency(i64),

    #[error("Unknown limit option: {0}")]
    UnknownOption(String),

    #[error("Malformed limit options: {0}")]
    Malformed(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
