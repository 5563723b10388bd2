//! Core traits for hoard abstractions.
//!
//! Resolvers and the worker are written against these traits so PostgreSQL,
//! HTTP and HTML implementations can be swapped for test doubles.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Durable job queue storage.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Create or update a queue definition. Safe to call on every start.
    async fn create_queue(&self, name: &str, policy: &QueuePolicy) -> Result<()>;

    /// Enqueue one job.
    async fn send(&self, queue: &str, data: JsonValue, options: &SendOptions) -> Result<Uuid>;

    /// Enqueue several jobs in one transaction.
    async fn insert(
        &self,
        queue: &str,
        data: Vec<JsonValue>,
        options: &SendOptions,
    ) -> Result<Vec<Uuid>>;

    /// Enqueue unless a job with the same key was created in the last
    /// `throttle_secs`. Returns `None` when suppressed.
    async fn send_throttled(
        &self,
        queue: &str,
        data: JsonValue,
        options: &SendOptions,
        throttle_secs: i32,
        key: &str,
    ) -> Result<Option<Uuid>>;

    /// Claim the next due job from any of `queues`, marking it active.
    async fn claim_next(&self, queues: &[String]) -> Result<Option<Job>>;

    /// Mark job as completed.
    async fn complete(&self, job_id: Uuid, output: Option<JsonValue>) -> Result<()>;

    /// Mark job as terminally failed.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Schedule another attempt, or fail the job once retries are exhausted.
    /// Returns the state the job ended up in.
    async fn retry(&self, job_id: Uuid, error: &str) -> Result<JobState>;

    /// Recover abandoned jobs and apply retention.
    async fn maintain(&self) -> Result<MaintenanceReport>;

    /// Get job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Job counts per state for a queue.
    async fn queue_stats(&self, queue: &str) -> Result<QueueStats>;
}

// =============================================================================
// RESOLVER STORAGE
// =============================================================================

/// Bookmark columns owned by the bookmark-metadata resolver.
#[async_trait]
pub trait BookmarkRepository: Send + Sync {
    /// Write the non-`None` fields of `update` to the owner's bookmark.
    async fn apply_metadata(
        &self,
        owner_id: Uuid,
        bookmark_id: Uuid,
        update: &BookmarkUpdate,
    ) -> Result<()>;
}

/// Archive columns owned by the archive resolver.
#[async_trait]
pub trait ArchiveRepository: Send + Sync {
    /// Store extracted content and mark the archive ready.
    async fn store_snapshot(
        &self,
        owner_id: Uuid,
        archive_id: Uuid,
        article: &ReadableArticle,
    ) -> Result<()>;

    /// Record a failure. The archive is still marked ready.
    async fn mark_failed(&self, owner_id: Uuid, archive_id: Uuid, error: &str) -> Result<()>;
}

/// Episode columns owned by the episode resolver, plus the feed lookup.
#[async_trait]
pub trait EpisodeRepository: Send + Sync {
    /// Store resolved media fields, set `ready` and clear `error`.
    async fn apply_resolution(
        &self,
        owner_id: Uuid,
        episode_id: Uuid,
        update: &EpisodeUpdate,
    ) -> Result<ResolvedEpisode>;

    /// Record a failure without touching `ready`.
    async fn mark_failed(&self, owner_id: Uuid, episode_id: Uuid, error: &str) -> Result<()>;

    /// Find an episode through its feed and the feed's access token.
    async fn find_feed_episode(
        &self,
        feed_id: Uuid,
        episode_id: Uuid,
        token: &str,
    ) -> Result<Option<FeedEpisode>>;
}

// =============================================================================
// EXTRACTION COLLABORATORS
// =============================================================================

/// Retrieves a bookmarked page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageDocument>;
}

/// Turns a page into a readable article. CPU bound; call from a blocking
/// thread.
pub trait ReadabilityExtractor: Send + Sync {
    fn extract(&self, document: &PageDocument) -> Result<ReadableArticle>;
}

/// Reads title, summary and tags from a page. CPU bound; call from a
/// blocking thread.
pub trait PageMetadataExtractor: Send + Sync {
    fn extract(&self, document: &PageDocument) -> Result<PageMetadata>;
}

/// Resolves playable media metadata for a source URL.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, url: &str, medium: Medium) -> Result<MediaMetadata>;
}
