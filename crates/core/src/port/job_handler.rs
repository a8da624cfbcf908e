// Job Handler Port
// Executes a reserved job; admission control never looks at the payload

use crate::domain::Job;
use crate::error::Result;
use async_trait::async_trait;

/// Job Handler trait
///
/// Implementations:
/// - CommandJobHandler (daemon): runs the payload as a child process
/// - MockJobHandler: scripted behavior for tests
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute a job to completion
    ///
    /// # Errors
    /// - AppError::Execution if the job ran and failed
    async fn perform(&self, job: &Job) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock handler behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always fail with message
        Fail(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Succeed after sleeping
        Sleep(Duration),
    }

    /// Mock Job Handler for testing
    pub struct MockJobHandler {
        behavior: Arc<Mutex<MockBehavior>>,
        performed: Arc<Mutex<Vec<String>>>,
    }

    impl MockJobHandler {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                performed: Arc::new(Mutex::new(Vec::new())),
            }
        }
        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }
        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }
        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }
        pub fn new_sleeping(duration: Duration) -> Self {
            Self::new(MockBehavior::Sleep(duration))
        }
        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }
        pub fn call_count(&self) -> usize {
            self.performed.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl JobHandler for MockJobHandler {
        async fn perform(&self, job: &Job) -> Result<()> {
            self.performed.lock().unwrap().push(job.id.clone());

            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Success => Ok(()),
                MockBehavior::Fail(msg) => Err(AppError::Execution(msg)),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
                MockBehavior::Sleep(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(())
                }
            }
        }
    }
}
