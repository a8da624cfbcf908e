// Worker - reservation + execution loop

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::coordinator::ReservationCoordinator;
use crate::domain::{Job, QueueId};
use crate::error::Result;
use crate::port::JobHandler;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

/// How a reserved job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
    Panicked(String),
    /// Still running when the shutdown grace period ran out
    Aborted,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

/// Worker polls the coordinator over its queues and executes what it gets
pub struct Worker {
    name: String,
    queues: Vec<QueueId>,
    coordinator: Arc<ReservationCoordinator>,
    handler: Arc<dyn JobHandler>,
    idle_sleep: Duration,
    shutdown_grace: Duration,
}

impl Worker {
    /// Create a worker for `queues`, listed highest priority first
    pub fn new(
        name: impl Into<String>,
        queues: Vec<QueueId>,
        coordinator: Arc<ReservationCoordinator>,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            queues,
            coordinator,
            handler,
            idle_sleep: IDLE_SLEEP_DURATION,
            shutdown_grace: SHUTDOWN_GRACE_DURATION,
        }
    }

    pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.idle_sleep = idle_sleep;
        self
    }

    /// How long a running job may finish after shutdown before it is aborted
    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run worker loop with graceful shutdown support.
    ///
    /// A job still running when shutdown arrives gets the grace period, then
    /// is aborted; its in-flight mark is cleared either way before returning.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(worker = %self.name, queues = ?self.queues, "Worker started");
        loop {
            if shutdown.is_shutdown() {
                info!(worker = %self.name, "Worker shutting down");
                break;
            }
            match self.process_cycle(Some(&mut shutdown)).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    // No job available, sleep briefly (or wait for shutdown)
                    if shutdown.sleep(self.idle_sleep).await {
                        info!(worker = %self.name, "Worker interrupted during idle");
                        break;
                    }
                }
                Err(e) => {
                    error!(worker = %self.name, error = %e, "Reservation cycle failed");
                    if shutdown.sleep(ERROR_RECOVERY_SLEEP_DURATION).await {
                        info!(worker = %self.name, "Worker interrupted during error recovery");
                        break;
                    }
                }
            }
        }
        info!(worker = %self.name, "Worker stopped");
        Ok(())
    }

    /// One reservation cycle; executes the job if one was reserved.
    ///
    /// `Ok(None)` means nothing was available. Job failures are reported in
    /// the outcome; only store/queue failures are errors.
    pub async fn process_next_job(&self) -> Result<Option<JobOutcome>> {
        self.process_cycle(None).await
    }

    async fn process_cycle(
        &self,
        shutdown: Option<&mut ShutdownToken>,
    ) -> Result<Option<JobOutcome>> {
        let Some(job) = self.coordinator.reserve(&self.queues).await? else {
            return Ok(None);
        };
        self.execute(job, shutdown).await.map(Some)
    }

    /// Execute a reserved job, tracking it as in flight for
    /// concurrency-limited queues on every exit path.
    async fn execute(
        &self,
        job: Job,
        shutdown: Option<&mut ShutdownToken>,
    ) -> Result<JobOutcome> {
        let throttler = self.coordinator.throttler();
        let tracked = throttler.registry().has_concurrency_limit(&job.queue);

        if tracked {
            if let Err(e) = throttler.concurrency().on_job_start(&job.queue).await {
                error!(
                    job_id = %job.id,
                    queue = %job.queue,
                    error = %e,
                    "Could not mark job in flight, job is dropped"
                );
                return Err(e);
            }
        }

        info!(worker = %self.name, job_id = %job.id, queue = %job.queue, "Executing job");

        // Execute in a separate task so a panicking handler cannot take the
        // in-flight bookkeeping down with it
        let job = Arc::new(job);
        let handler = Arc::clone(&self.handler);
        let job_for_exec = Arc::clone(&job);
        let handle = tokio::task::spawn(async move { handler.perform(&job_for_exec).await });

        let outcome = match self.join_handler(handle, shutdown).await {
            Ok(Ok(())) => {
                info!(job_id = %job.id, queue = %job.queue, "Job completed");
                JobOutcome::Succeeded
            }
            Ok(Err(e)) => {
                warn!(job_id = %job.id, queue = %job.queue, error = %e, "Job failed");
                JobOutcome::Failed(e.to_string())
            }
            Err(join_err) if join_err.is_cancelled() => {
                warn!(job_id = %job.id, queue = %job.queue, "Job aborted at shutdown");
                JobOutcome::Aborted
            }
            Err(join_err) => {
                error!(job_id = %job.id, queue = %job.queue, error = ?join_err, "Job panicked");
                JobOutcome::Panicked(panic_message(join_err))
            }
        };

        if tracked {
            throttler.concurrency().on_job_end(&job.queue).await.map_err(|e| {
                error!(job_id = %job.id, queue = %job.queue, error = %e, "Could not clear in-flight mark");
                e
            })?;
        }

        Ok(outcome)
    }

    /// Wait for the handler task. Once shutdown is requested the task gets
    /// `shutdown_grace` to finish, then it is aborted.
    async fn join_handler(
        &self,
        mut handle: JoinHandle<Result<()>>,
        shutdown: Option<&mut ShutdownToken>,
    ) -> std::result::Result<Result<()>, JoinError> {
        let Some(shutdown) = shutdown else {
            return handle.await;
        };

        tokio::select! {
            joined = &mut handle => return joined,
            _ = shutdown.wait() => {}
        }

        info!(
            worker = %self.name,
            grace_ms = self.shutdown_grace.as_millis() as u64,
            "Shutdown requested while a job is running"
        );
        match tokio::time::timeout(self.shutdown_grace, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                handle.await
            }
        }
    }
}

fn panic_message(join_err: JoinError) -> String {
    let payload = join_err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
