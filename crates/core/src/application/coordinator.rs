//! Reservation Coordinator - one admission decision per poll cycle
//!
//! Walks the queues in priority order and hands back at most one job:
//!
//! 1. Unthrottled queue: dequeue directly.
//! 2. Throttled queue: take the queue lock or skip the queue this cycle.
//! 3. Under the lock: skip if the throughput window is full.
//! 4. Under the lock: skip if the concurrency limit is reached.
//! 5. Under the lock: dequeue; on success record the start.
//!
//! The lock is released on every path out of step 2. Nothing here waits:
//! a busy or full queue is simply retried on the caller's next cycle.

use super::throttler::Throttler;
use crate::domain::{Job, QueueId};
use crate::error::Result;
use crate::port::JobQueue;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct ReservationCoordinator {
    throttler: Arc<Throttler>,
    job_queue: Arc<dyn JobQueue>,
}

impl ReservationCoordinator {
    pub fn new(throttler: Arc<Throttler>, job_queue: Arc<dyn JobQueue>) -> Self {
        Self {
            throttler,
            job_queue,
        }
    }

    pub fn throttler(&self) -> &Arc<Throttler> {
        &self.throttler
    }

    /// Run one reservation cycle over `queues` (highest priority first).
    ///
    /// Returns `Ok(None)` when no queue could hand out a job. Store and queue
    /// failures are returned unchanged, after the attempt's lock was released
    /// where possible.
    pub async fn reserve(&self, queues: &[QueueId]) -> Result<Option<Job>> {
        for queue in queues {
            let job = if self.throttler.is_throttled(queue) {
                self.reserve_throttled(queue).await?
            } else {
                self.job_queue.dequeue_one(queue).await?
            };

            if let Some(job) = job {
                info!(queue = %queue, job_id = %job.id, "Job reserved");
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn reserve_throttled(&self, queue: &str) -> Result<Option<Job>> {
        let lock = self.throttler.lock();
        if !lock.try_acquire(queue).await? {
            debug!(queue = %queue, "Queue locked by another worker, skipping");
            return Ok(None);
        }

        let outcome = self.reserve_locked(queue).await;
        let released = lock.release(queue).await;

        match (outcome, released) {
            (Ok(job), Ok(())) => Ok(job),
            (Ok(Some(job)), Err(e)) => {
                // Start already recorded; the lock expires on its own
                warn!(queue = %queue, job_id = %job.id, error = %e, "Lock release failed after reservation");
                Ok(Some(job))
            }
            (Ok(None), Err(e)) => Err(e),
            (Err(e), Err(release_err)) => {
                warn!(queue = %queue, error = %release_err, "Lock release failed after error");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }

    /// Steps 3-5; caller holds the queue lock
    async fn reserve_locked(&self, queue: &str) -> Result<Option<Job>> {
        if self.throttler.throughput().is_over_limit(queue).await? {
            debug!(queue = %queue, "Throughput limit reached, skipping");
            return Ok(None);
        }

        if self.throttler.registry().has_concurrency_limit(queue)
            && self.throttler.concurrency().is_over_limit(queue).await?
        {
            debug!(queue = %queue, "Concurrency limit reached, skipping");
            return Ok(None);
        }

        let Some(job) = self.job_queue.dequeue_one(queue).await? else {
            return Ok(None);
        };

        if let Err(e) = self.throttler.throughput().record_start(queue).await {
            error!(
                queue = %queue,
                job_id = %job.id,
                error = %e,
                "Failed to record job start, job was dequeued and is dropped"
            );
            return Err(e);
        }

        Ok(Some(job))
    }
}
