// Job Domain Model

use super::queue::QueueId;
use serde::{Deserialize, Serialize};

/// Job ID (UUID v4)
pub type JobId = String;

/// Job Payload (JSON serializable, opaque to admission control)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload(serde_json::Value);

impl JobPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// A job handed out by the job queue collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue: QueueId,
    pub payload: JobPayload,
    /// Enqueue timestamp (ms since epoch)
    pub enqueued_at: i64,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        queue: impl Into<String>,
        payload: JobPayload,
        enqueued_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            queue: queue.into(),
            payload,
            enqueued_at,
        }
    }

    /// Create a job for tests (random id, current timestamp)
    pub fn new_test(queue: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            queue,
            JobPayload::new(payload),
            chrono::Utc::now().timestamp_millis(),
        )
    }
}
