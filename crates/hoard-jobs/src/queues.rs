//! Typed queue handles and the resolution queues.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use hoard_core::{
    defaults, JobRepository, QueueOverrides, QueuePolicy, ResolveArchivePayload,
    ResolveBookmarkPayload, ResolveEpisodePayload, Result, SendOptions,
};

/// Queue consumed by the resolution orchestrator.
pub const RESOLVE_BOOKMARK: &str = "resolve-bookmark";
/// Follow-on queue for a single archive.
pub const RESOLVE_ARCHIVE: &str = "resolve-archive";
/// Follow-on queue for a single episode.
pub const RESOLVE_EPISODE: &str = "resolve-episode";

/// Handle to one named queue carrying payloads of type `P`.
pub struct Queue<P> {
    name: String,
    policy: QueuePolicy,
    repo: Arc<dyn JobRepository>,
    _payload: PhantomData<fn(P)>,
}

impl<P> Clone for Queue<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            policy: self.policy,
            repo: self.repo.clone(),
            _payload: PhantomData,
        }
    }
}

impl<P> fmt::Debug for Queue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<P: Serialize> Queue<P> {
    /// Create (or update) the queue with the baseline policy plus
    /// `overrides`. Safe to call on every start.
    pub async fn create(
        repo: Arc<dyn JobRepository>,
        name: &str,
        overrides: QueueOverrides,
    ) -> Result<Self> {
        let policy = QueuePolicy::default().with_overrides(&overrides);
        repo.create_queue(name, &policy).await?;
        info!(
            queue = name,
            retry_limit = policy.retry_limit,
            retry_delay_secs = policy.retry_delay_secs,
            retry_backoff = policy.retry_backoff,
            "Queue ready"
        );
        Ok(Self {
            name: name.to_string(),
            policy,
            repo,
            _payload: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    /// Enqueue one job.
    pub async fn send(&self, payload: &P, options: &SendOptions) -> Result<Uuid> {
        let id = self
            .repo
            .send(&self.name, serde_json::to_value(payload)?, options)
            .await?;
        debug!(queue = %self.name, job_id = %id, "Job sent");
        Ok(id)
    }

    /// Enqueue several jobs at once.
    pub async fn insert(&self, payloads: &[P], options: &SendOptions) -> Result<Vec<Uuid>> {
        let data = payloads
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let ids = self.repo.insert(&self.name, data, options).await?;
        debug!(queue = %self.name, count = ids.len(), "Jobs inserted");
        Ok(ids)
    }

    /// Enqueue unless a job keyed `key` was created within `throttle_secs`.
    pub async fn send_throttled(
        &self,
        payload: &P,
        options: &SendOptions,
        throttle_secs: i32,
        key: &str,
    ) -> Result<Option<Uuid>> {
        let sent = self
            .repo
            .send_throttled(
                &self.name,
                serde_json::to_value(payload)?,
                options,
                throttle_secs,
                key,
            )
            .await?;
        match sent {
            Some(id) => debug!(queue = %self.name, job_id = %id, key, "Job sent"),
            None => debug!(queue = %self.name, key, throttle_secs, "Job throttled"),
        }
        Ok(sent)
    }
}

/// The three resolution queues.
#[derive(Debug, Clone)]
pub struct ResolutionQueues {
    pub bookmark: Queue<ResolveBookmarkPayload>,
    pub archive: Queue<ResolveArchivePayload>,
    pub episode: Queue<ResolveEpisodePayload>,
}

/// Create every resolution queue with the baseline policy.
pub async fn register_queues(repo: Arc<dyn JobRepository>) -> Result<ResolutionQueues> {
    Ok(ResolutionQueues {
        bookmark: Queue::create(repo.clone(), RESOLVE_BOOKMARK, QueueOverrides::default())
            .await?,
        archive: Queue::create(repo.clone(), RESOLVE_ARCHIVE, QueueOverrides::default()).await?,
        episode: Queue::create(repo, RESOLVE_EPISODE, QueueOverrides::default()).await?,
    })
}

/// Entry points that start resolution work.
#[derive(Debug, Clone)]
pub struct ResolutionTriggers {
    queues: ResolutionQueues,
    throttle_secs: i32,
}

impl ResolutionTriggers {
    pub fn new(queues: ResolutionQueues) -> Self {
        Self {
            queues,
            throttle_secs: defaults::RETRIGGER_THROTTLE_SECS,
        }
    }

    pub fn with_throttle_secs(mut self, secs: i32) -> Self {
        self.throttle_secs = secs;
        self
    }

    pub fn queues(&self) -> &ResolutionQueues {
        &self.queues
    }

    /// Queue resolution for a newly created bookmark.
    pub async fn request_bookmark_resolution(
        &self,
        payload: &ResolveBookmarkPayload,
    ) -> Result<Uuid> {
        self.queues
            .bookmark
            .send(payload, &SendOptions::default())
            .await
    }

    /// Re-resolve one archive. Bursts for the same archive collapse into a
    /// single pending job.
    pub async fn retry_archive(&self, payload: &ResolveArchivePayload) -> Result<Option<Uuid>> {
        let key = format!("archive:{}", payload.archive_id);
        self.queues
            .archive
            .send_throttled(payload, &SendOptions::default(), self.throttle_secs, &key)
            .await
    }

    /// Re-resolve one episode. Bursts for the same episode collapse into a
    /// single pending job.
    pub async fn retry_episode(&self, payload: &ResolveEpisodePayload) -> Result<Option<Uuid>> {
        let key = format!("episode:{}", payload.episode_id);
        self.queues
            .episode
            .send_throttled(payload, &SendOptions::default(), self.throttle_secs, &key)
            .await
    }
}
