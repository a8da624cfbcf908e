// Job Queue Port (Interface)

use crate::domain::Job;
use crate::error::Result;
use async_trait::async_trait;

/// The job queue collaborator.
///
/// Storage and ordering belong to the implementation; admission control only
/// ever asks for one job at a time.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Remove and return the next job of `queue`, or `None` when it is empty.
    ///
    /// May be called concurrently by many callers; each call hands out at
    /// most one job and never the same job twice.
    async fn dequeue_one(&self, queue: &str) -> Result<Option<Job>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// FIFO queues held in memory
    #[derive(Default)]
    pub struct InMemoryJobQueue {
        queues: Mutex<HashMap<String, VecDeque<Job>>>,
        dequeue_calls: Mutex<Vec<String>>,
        unavailable: AtomicBool,
    }

    impl InMemoryJobQueue {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, job: Job) {
            self.queues
                .lock()
                .unwrap()
                .entry(job.queue.clone())
                .or_default()
                .push_back(job);
        }

        /// Push `count` test jobs onto `queue`
        pub fn push_many(&self, queue: &str, count: usize) {
            for i in 0..count {
                self.push(Job::new_test(queue, serde_json::json!({ "n": i })));
            }
        }

        pub fn len(&self, queue: &str) -> usize {
            self.queues
                .lock()
                .unwrap()
                .get(queue)
                .map_or(0, VecDeque::len)
        }

        /// Queue names passed to `dequeue_one`, in call order
        pub fn dequeue_calls(&self) -> Vec<String> {
            self.dequeue_calls.lock().unwrap().clone()
        }

        /// Make every following dequeue fail with `QueueUnavailable`
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl JobQueue for InMemoryJobQueue {
        async fn dequeue_one(&self, queue: &str) -> Result<Option<Job>> {
            self.dequeue_calls.lock().unwrap().push(queue.to_string());
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AppError::QueueUnavailable(format!(
                    "queue '{}' switched off",
                    queue
                )));
            }
            Ok(self
                .queues
                .lock()
                .unwrap()
                .get_mut(queue)
                .and_then(VecDeque::pop_front))
        }
    }
}
