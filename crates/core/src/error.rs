// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// A reservation cycle either returns a job, returns nothing, or surfaces one
/// of these unchanged. Nothing in core retries.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or incomplete limit configuration (raised at set-up time only)
    #[error("Configuration error: {0}")]
    Configuration(#[from] crate::domain::DomainError),

    /// Shared key-value store unreachable or erroring
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Job queue collaborator failed
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Job handler reported a failure while executing a job
    #[error("Execution error: {0}")]
    Execution(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by converting to AppError::StoreUnavailable / QueueUnavailable (String)
