// SQLite JobQueue Implementation

use crate::error::queue_error;
use async_trait::async_trait;
use gatekeeper_core::domain::{Job, JobPayload};
use gatekeeper_core::error::{AppError, Result};
use gatekeeper_core::port::{IdProvider, JobQueue, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, error};

pub struct SqliteJobQueue {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
}

impl SqliteJobQueue {
    pub fn new(
        pool: SqlitePool,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            pool,
            time_provider,
            id_provider,
        }
    }

    /// Append a job to the tail of `queue`
    pub async fn enqueue(&self, queue: &str, payload: serde_json::Value) -> Result<Job> {
        if queue.trim().is_empty() {
            return Err(AppError::QueueUnavailable(
                "queue name must not be empty".to_string(),
            ));
        }

        let job = Job::new(
            self.id_provider.generate_id(),
            queue,
            JobPayload::new(payload),
            self.time_provider.now_millis(),
        );

        sqlx::query("INSERT INTO jobs (id, queue, payload, enqueued_at) VALUES (?, ?, ?, ?)")
            .bind(&job.id)
            .bind(&job.queue)
            .bind(job.payload.as_value().to_string())
            .bind(job.enqueued_at)
            .execute(&self.pool)
            .await
            .map_err(queue_error)?;

        debug!(job_id = %job.id, queue = %job.queue, "Job enqueued");
        Ok(job)
    }

    /// Number of jobs waiting in `queue`
    pub async fn pending_count(&self, queue: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE queue = ?")
            .bind(queue)
            .fetch_one(&self.pool)
            .await
            .map_err(queue_error)
    }

    /// Queues that currently hold jobs, sorted by name
    pub async fn queue_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT queue FROM jobs ORDER BY queue")
            .fetch_all(&self.pool)
            .await
            .map_err(queue_error)
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn dequeue_one(&self, queue: &str) -> Result<Option<Job>> {
        // Single statement: concurrent callers can never receive the same row
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            DELETE FROM jobs
            WHERE seq = (
                SELECT seq FROM jobs
                WHERE queue = ?
                ORDER BY seq ASC
                LIMIT 1
            )
            RETURNING id, queue, payload, enqueued_at
            "#,
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await
        .map_err(queue_error)?;

        row.map(JobRow::into_job).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    queue: String,
    payload: String,
    enqueued_at: i64,
}

impl JobRow {
    /// The row is already deleted, so an unreadable payload means the job is lost
    fn into_job(self) -> Result<Job> {
        let payload: serde_json::Value = serde_json::from_str(&self.payload).map_err(|e| {
            error!(
                job_id = %self.id,
                queue = %self.queue,
                error = %e,
                "Dequeued job has an unreadable payload and was dropped"
            );
            AppError::QueueUnavailable(format!("job {} has an unreadable payload: {}", self.id, e))
        })?;
        Ok(Job::new(
            self.id,
            self.queue,
            JobPayload::new(payload),
            self.enqueued_at,
        ))
    }
}
