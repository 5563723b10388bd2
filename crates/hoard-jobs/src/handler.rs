//! Job handler contract.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use hoard_core::{Error, Job, Result};

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// Number of earlier attempts.
    pub fn attempt(&self) -> i32 {
        self.job.retry_count
    }

    /// Raw job data.
    pub fn data(&self) -> &JsonValue {
        &self.job.data
    }

    /// Decode the job data into a typed payload.
    pub fn payload<P: DeserializeOwned>(&self) -> Result<P> {
        serde_json::from_value(self.job.data.clone()).map_err(|e| {
            Error::Serialization(format!(
                "invalid payload for {} job {}: {}",
                self.job.queue, self.job.id, e
            ))
        })
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully with optional output.
    Success(Option<JsonValue>),
    /// Job failed permanently.
    Failed(String),
    /// Job should go through the queue's retry policy.
    Retry(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The queue this handler consumes.
    fn queue(&self) -> &str;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler consumes the given queue.
    fn can_handle(&self, queue: &str) -> bool {
        self.queue() == queue
    }
}

/// No-op handler for testing.
pub struct NoOpHandler {
    queue: String,
}

impl NoOpHandler {
    /// Create a new no-op handler for the given queue.
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        JobResult::Success(None)
    }
}
