//! Job worker pool for the durable queues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use hoard_core::{defaults, Job, JobRepository, JobState, MaintenanceReport, Result};

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::DEFAULT_POLL_INTERVAL_MS;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Whether to enable job processing.
    pub enabled: bool,
    /// How often abandoned and expired jobs are swept.
    pub maintenance_interval: Duration,
    /// Per-job execution limit.
    pub job_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: defaults::JOB_WORKER_ENABLED,
            maintenance_interval: Duration::from_secs(defaults::JOB_MAINTENANCE_INTERVAL_SECS),
            job_timeout: Duration::from_secs(defaults::JOB_TIMEOUT_SECS),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `JOB_POLL_INTERVAL_MS` | `500` | Polling interval when queues are empty |
    /// | `JOB_MAINTENANCE_INTERVAL_SECS` | `60` | Queue maintenance interval |
    /// | `JOB_TIMEOUT_SECS` | `300` | Per-job execution limit, capped below the queue's `expire_secs` |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(defaults::JOB_WORKER_ENABLED);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        let maintenance_secs = std::env::var("JOB_MAINTENANCE_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_MAINTENANCE_INTERVAL_SECS);

        let timeout_secs = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_TIMEOUT_SECS);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            enabled,
            maintenance_interval: Duration::from_secs(maintenance_secs),
            job_timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was started.
    JobStarted { job_id: Uuid, queue: String },
    /// A job completed successfully.
    JobCompleted { job_id: Uuid, queue: String },
    /// A job attempt failed. `retrying` tells whether another attempt is
    /// scheduled.
    JobFailed {
        job_id: Uuid,
        queue: String,
        error: String,
        retrying: bool,
    },
    /// A maintenance sweep finished.
    Maintenance(MaintenanceReport),
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| hoard_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

type HandlerMap = Arc<RwLock<HashMap<String, Arc<dyn JobHandler>>>>;

/// Job worker that processes jobs from every queue it has a handler for.
pub struct JobWorker {
    repo: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(repo: Arc<dyn JobRepository>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::WORKER_EVENT_CAPACITY);
        Self {
            repo,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Register a handler for its queue.
    pub async fn register_handler<H: JobHandler + 'static>(&self, handler: H) {
        self.insert_handler(Arc::new(handler)).await;
    }

    async fn insert_handler(&self, handler: Arc<dyn JobHandler>) {
        let queue = handler.queue().to_string();
        debug!(queue = %queue, "Registered job handler");
        self.handlers.write().await.insert(queue, handler);
    }

    /// Queues with a registered handler, sorted.
    pub async fn queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        queues.sort();
        queues
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the worker loop.
    ///
    /// Claims up to `max_concurrent_jobs` at a time and processes them
    /// concurrently. Only sleeps when every queue is empty.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        let queues = self.queues().await;
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            queues = ?queues,
            "Job worker started"
        );

        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let max_concurrent = self.config.max_concurrent_jobs.max(1);
        let mut last_maintenance: Option<Instant> = None;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            let maintenance_due = last_maintenance
                .map_or(true, |at| at.elapsed() >= self.config.maintenance_interval);
            if maintenance_due {
                self.run_maintenance().await;
                last_maintenance = Some(Instant::now());
            }

            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..max_concurrent {
                match self.claim_job(&queues).await {
                    Some(job) => {
                        claimed += 1;
                        let worker = self.clone_refs();
                        tasks.spawn(async move {
                            worker.execute_job(job).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing concurrent job batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    async fn run_maintenance(&self) {
        match self.repo.maintain().await {
            Ok(report) => {
                debug!(?report, "Queue maintenance finished");
                let _ = self.event_tx.send(WorkerEvent::Maintenance(report));
            }
            Err(e) => error!(error = %e, "Queue maintenance failed"),
        }
    }

    /// Claim the next available job without processing it.
    async fn claim_job(&self, queues: &[String]) -> Option<Job> {
        if queues.is_empty() {
            return None;
        }
        match self.repo.claim_next(queues).await {
            Ok(job) => job,
            Err(e) => {
                error!(error = ?e, "Failed to claim job");
                None
            }
        }
    }

    /// Clone references needed for spawned job tasks.
    fn clone_refs(&self) -> JobWorkerRef {
        JobWorkerRef {
            repo: self.repo.clone(),
            handlers: self.handlers.clone(),
            event_tx: self.event_tx.clone(),
            job_timeout: self.config.job_timeout,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }
}

/// Execution limit for one attempt.
///
/// Kept under the job's active expiry so maintenance never re-queues an
/// attempt that is still running.
fn attempt_timeout(configured: Duration, expire_secs: i32) -> Duration {
    if expire_secs <= 0 {
        return configured;
    }
    let expiry_bound = Duration::from_secs((expire_secs as u64).saturating_sub(1).max(1));
    configured.min(expiry_bound)
}

/// Lightweight reference bundle for executing a single job in a spawned task.
struct JobWorkerRef {
    repo: Arc<dyn JobRepository>,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
    job_timeout: Duration,
}

impl JobWorkerRef {
    /// Run the handler in its own task so a panic or timeout settles the job
    /// through the retry policy instead of leaving it active.
    async fn run_handler(&self, handler: Arc<dyn JobHandler>, job: Job) -> JobResult {
        let job_timeout = attempt_timeout(self.job_timeout, job.expire_secs);
        let mut task = tokio::spawn(async move { handler.execute(JobContext::new(job)).await });

        match tokio::time::timeout(job_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => JobResult::Retry(format!("Job handler panicked: {}", e)),
            Err(_) => {
                task.abort();
                JobResult::Retry(format!(
                    "Job exceeded timeout of {}s",
                    job_timeout.as_secs()
                ))
            }
        }
    }

    /// Execute a single claimed job.
    async fn execute_job(self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;
        let queue = job.queue.clone();

        info!(%job_id, queue = %queue, attempt = job.retry_count, "Processing job");

        let _ = self.event_tx.send(WorkerEvent::JobStarted {
            job_id,
            queue: queue.clone(),
        });

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&queue).cloned()
        };

        let result = match handler {
            Some(handler) => self.run_handler(handler, job).await,
            None => {
                warn!(queue = %queue, "No handler registered for queue");
                JobResult::Failed(format!("No handler for queue: {}", queue))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            JobResult::Success(output) => {
                if let Err(e) = self.repo.complete(job_id, output).await {
                    error!(error = ?e, %job_id, "Failed to mark job as completed");
                } else {
                    info!(%job_id, queue = %queue, duration_ms, "Job completed successfully");
                    let _ = self
                        .event_tx
                        .send(WorkerEvent::JobCompleted { job_id, queue });
                }
            }
            JobResult::Failed(error) => {
                if let Err(e) = self.repo.fail(job_id, &error).await {
                    error!(error = ?e, %job_id, "Failed to mark job as failed");
                } else {
                    warn!(%job_id, queue = %queue, %error, duration_ms, "Job failed");
                    let _ = self.event_tx.send(WorkerEvent::JobFailed {
                        job_id,
                        queue,
                        error,
                        retrying: false,
                    });
                }
            }
            JobResult::Retry(error) => match self.repo.retry(job_id, &error).await {
                Ok(state) => {
                    let retrying = state == JobState::Retry;
                    warn!(
                        %job_id,
                        queue = %queue,
                        %error,
                        retrying,
                        duration_ms,
                        "Job attempt failed"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobFailed {
                        job_id,
                        queue,
                        error,
                        retrying,
                    });
                }
                Err(e) => error!(error = ?e, %job_id, "Failed to schedule job retry"),
            },
        }
    }
}

/// Builder for creating a job worker with handlers.
pub struct WorkerBuilder {
    repo: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: Vec<Arc<dyn JobHandler>>,
}

impl WorkerBuilder {
    /// Create a new worker builder.
    pub fn new(repo: Arc<dyn JobRepository>) -> Self {
        Self {
            repo,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a handler.
    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Build and return the worker.
    pub async fn build(self) -> JobWorker {
        let worker = JobWorker::new(self.repo, self.config);
        for handler in self.handlers {
            worker.insert_handler(handler).await;
        }
        worker
    }
}
