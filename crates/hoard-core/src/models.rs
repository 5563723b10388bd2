//! Domain models shared across hoard crates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;
use crate::error::Error;

// =============================================================================
// MEDIA
// =============================================================================

/// Coarse media kind requested for an episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Medium {
    #[default]
    Video,
    Audio,
}

impl Medium {
    pub fn as_str(&self) -> &'static str {
        match self {
            Medium::Video => "video",
            Medium::Audio => "audio",
        }
    }

    /// The other medium, used as the format fallback.
    pub fn opposite(&self) -> Medium {
        match self {
            Medium::Video => Medium::Audio,
            Medium::Audio => Medium::Video,
        }
    }

    /// Preferred containers for this medium, best first.
    pub fn containers(&self) -> &'static [&'static str] {
        match self {
            Medium::Video => defaults::VIDEO_CONTAINERS,
            Medium::Audio => defaults::AUDIO_CONTAINERS,
        }
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Medium {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "video" => Ok(Medium::Video),
            "audio" => Ok(Medium::Audio),
            other => Err(Error::InvalidInput(format!("unknown medium: {}", other))),
        }
    }
}

/// Playable source classification persisted as `episodes.src_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SrcType {
    Audio,
    Video,
}

impl SrcType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SrcType::Audio => "audio",
            SrcType::Video => "video",
        }
    }

    /// Classify a file extension, `None` when it is not a known media type.
    pub fn from_extension(ext: &str) -> Option<SrcType> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if defaults::AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(SrcType::Audio)
        } else if defaults::VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(SrcType::Video)
        } else {
            None
        }
    }
}

impl fmt::Display for SrcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SrcType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "audio" => Ok(SrcType::Audio),
            "video" => Ok(SrcType::Video),
            other => Err(Error::InvalidInput(format!("unknown src type: {}", other))),
        }
    }
}

/// Response of the media extraction service.
///
/// The service reports either exact or approximate duration and size; both
/// spellings are accepted and the accessors prefer the exact value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub ext: Option<String>,
    pub duration: Option<f64>,
    pub duration_approx: Option<f64>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
    pub channel: Option<String>,
    pub uploader: Option<String>,
    /// Direct, time-limited media URL.
    pub url: Option<String>,
    pub filename: Option<String>,
    /// Extractor's own type tag ("audio", "video", ...).
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Filled in by the extraction client after classification.
    #[serde(default)]
    pub src_type: Option<SrcType>,
}

impl MediaMetadata {
    /// Duration in whole seconds, rounded.
    pub fn duration_secs(&self) -> Option<i32> {
        self.duration
            .or(self.duration_approx)
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as i32)
    }

    /// Size in bytes, rounded.
    pub fn size_bytes(&self) -> Option<i64> {
        self.filesize
            .or(self.filesize_approx)
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(|s| s.round() as i64)
    }

    /// Channel name, falling back to the uploader.
    pub fn author(&self) -> Option<&str> {
        self.channel.as_deref().or(self.uploader.as_deref())
    }

    /// Classify `ext` into a src type, falling back to the extractor's tag.
    pub fn classify(&self) -> Option<SrcType> {
        self.ext
            .as_deref()
            .and_then(SrcType::from_extension)
            .or_else(|| self.kind.as_deref().and_then(|k| k.parse().ok()))
    }
}

/// Metadata memo key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataKey {
    pub url: String,
    pub medium: Medium,
}

impl MetadataKey {
    pub fn new(url: impl Into<String>, medium: Medium) -> Self {
        Self {
            url: url.into(),
            medium,
        }
    }
}

/// Direct-URL serving key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectUrlKey {
    pub owner_id: Uuid,
    pub episode_id: Uuid,
    pub url: String,
    /// Persisted episode `type` column.
    pub entity_type: String,
    pub medium: Medium,
}

// =============================================================================
// PAGES
// =============================================================================

/// A fetched page, shared between the resolvers that need its content.
///
/// Holds raw HTML so it can cross task boundaries; each consumer parses it
/// on a blocking thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDocument {
    /// URL that was requested.
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    pub html: String,
}

/// Readable-mode rendition of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadableArticle {
    pub title: Option<String>,
    pub site_name: Option<String>,
    pub content: Option<String>,
    pub text_content: Option<String>,
    pub length: Option<i32>,
    pub excerpt: Option<String>,
    pub byline: Option<String>,
    pub direction: Option<String>,
    pub language: Option<String>,
}

/// Descriptive metadata found in a page's head.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

// =============================================================================
// RESOLVER WRITES
// =============================================================================

/// Columns the bookmark-metadata resolver writes. `None` leaves a column as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkUpdate {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl BookmarkUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.summary.is_none() && self.tags.is_none()
    }
}

/// Columns written on a successful episode resolution.
///
/// `ready` is always set and `error` always cleared alongside these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeUpdate {
    pub url: String,
    pub title: Option<String>,
    pub size_in_bytes: Option<i64>,
    pub duration_in_seconds: Option<i32>,
    pub author: Option<String>,
    pub filename: Option<String>,
    pub ext: Option<String>,
    pub src_type: Option<SrcType>,
}

/// Persisted episode columns needed to build a [`DirectUrlKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEpisode {
    pub entity_type: String,
    pub medium: Medium,
}

/// An episode as seen through a tokenized feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEpisode {
    pub owner_id: Uuid,
    pub episode_id: Uuid,
    pub url: String,
    pub entity_type: String,
    pub medium: Medium,
    pub ready: bool,
}

impl FeedEpisode {
    pub fn direct_url_key(&self) -> DirectUrlKey {
        DirectUrlKey {
            owner_id: self.owner_id,
            episode_id: self.episode_id,
            url: self.url.clone(),
            entity_type: self.entity_type.clone(),
            medium: self.medium,
        }
    }
}

// =============================================================================
// QUEUE PAYLOADS
// =============================================================================

/// Fields the user typed in when creating the bookmark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProvidedMeta {
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub summary: Option<String>,
}

/// Payload of the `resolve-bookmark` queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveBookmarkPayload {
    pub user_id: Uuid,
    pub bookmark_id: Uuid,
    pub url: String,
    #[serde(default)]
    pub resolve_bookmark: bool,
    #[serde(default)]
    pub resolve_archive: bool,
    #[serde(default)]
    pub resolve_episode: bool,
    #[serde(default)]
    pub user_provided_meta: UserProvidedMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_medium: Option<Medium>,
}

/// Payload of the `resolve-archive` follow-on queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveArchivePayload {
    pub user_id: Uuid,
    pub archive_id: Uuid,
    pub url: String,
}

/// Payload of the `resolve-episode` follow-on queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveEpisodePayload {
    pub user_id: Uuid,
    pub episode_id: Uuid,
    pub url: String,
    #[serde(default)]
    pub medium: Medium,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark_title: Option<String>,
}

// =============================================================================
// JOB TYPES
// =============================================================================

/// State of a job in the durable queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Created,
    Active,
    Completed,
    Retry,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Retry => "retry",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Whether a job in this state is waiting to be claimed.
    pub fn is_queued(&self) -> bool {
        matches!(self, JobState::Created | JobState::Retry)
    }

    /// Whether the job has reached a final state.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(JobState::Created),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "retry" => Ok(JobState::Retry),
            "failed" => Ok(JobState::Failed),
            "cancelled" => Ok(JobState::Cancelled),
            other => Err(Error::Job(format!("unknown job state: {}", other))),
        }
    }
}

/// A job in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub queue: String,
    pub state: JobState,
    pub data: JsonValue,
    pub priority: i32,
    pub retry_count: i32,
    pub retry_limit: i32,
    pub retry_delay_secs: i32,
    pub retry_backoff: bool,
    pub start_after: DateTime<Utc>,
    pub expire_secs: i32,
    pub singleton_key: Option<String>,
    pub keep_until: DateTime<Utc>,
    pub output: Option<JsonValue>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Delay before the next attempt, or `None` when retries are exhausted.
    pub fn next_retry_delay_secs(&self) -> Option<i64> {
        if self.retry_count >= self.retry_limit {
            return None;
        }
        Some(retry_delay_secs(
            self.retry_delay_secs,
            self.retry_backoff,
            self.retry_count,
        ))
    }
}

/// Retry delay for the attempt after `retry_count` previous retries.
///
/// With backoff the base delay doubles per retry, capped at one hour.
pub fn retry_delay_secs(base_secs: i32, backoff: bool, retry_count: i32) -> i64 {
    let base = i64::from(base_secs.max(0));
    if !backoff {
        return base;
    }
    let exponent = retry_count.clamp(0, 30) as u32;
    base.saturating_mul(1i64 << exponent)
        .min(defaults::QUEUE_RETRY_DELAY_MAX_SECS)
}

/// Policy stored per queue and copied onto each job at send time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePolicy {
    pub retry_limit: i32,
    pub retry_delay_secs: i32,
    pub retry_backoff: bool,
    pub retention_secs: i32,
    pub expire_secs: i32,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            retry_limit: defaults::QUEUE_RETRY_LIMIT,
            retry_delay_secs: defaults::QUEUE_RETRY_DELAY_SECS,
            retry_backoff: defaults::QUEUE_RETRY_BACKOFF,
            retention_secs: defaults::QUEUE_RETENTION_SECS,
            expire_secs: defaults::QUEUE_EXPIRE_SECS,
        }
    }
}

impl QueuePolicy {
    /// Baseline policy with per-queue overrides applied.
    pub fn with_overrides(mut self, overrides: &QueueOverrides) -> Self {
        if let Some(v) = overrides.retry_limit {
            self.retry_limit = v;
        }
        if let Some(v) = overrides.retry_delay_secs {
            self.retry_delay_secs = v;
        }
        if let Some(v) = overrides.retry_backoff {
            self.retry_backoff = v;
        }
        if let Some(v) = overrides.retention_secs {
            self.retention_secs = v;
        }
        if let Some(v) = overrides.expire_secs {
            self.expire_secs = v;
        }
        self
    }
}

/// Per-queue deviations from [`QueuePolicy::default`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOverrides {
    pub retry_limit: Option<i32>,
    pub retry_delay_secs: Option<i32>,
    pub retry_backoff: Option<bool>,
    pub retention_secs: Option<i32>,
    pub expire_secs: Option<i32>,
}

/// Per-send options. Unset fields inherit the queue's policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub priority: i32,
    pub start_after_secs: Option<i32>,
    pub retry_limit: Option<i32>,
    pub retry_delay_secs: Option<i32>,
    pub retry_backoff: Option<bool>,
}

impl SendOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_start_after_secs(mut self, secs: i32) -> Self {
        self.start_after_secs = Some(secs);
        self
    }

    pub fn with_retry_limit(mut self, limit: i32) -> Self {
        self.retry_limit = Some(limit);
        self
    }
}

/// Job counts per state for one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue: String,
    pub created: i64,
    pub active: i64,
    pub retry: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

/// What a maintenance pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Abandoned active jobs sent back through the retry path.
    pub requeued: u64,
    /// Queued jobs that outlived their retention and were failed.
    pub expired: u64,
    /// Settled jobs deleted after their retention.
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_medium_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Medium::Video).unwrap(), "\"video\"");
        let parsed: Medium = serde_json::from_str("\"audio\"").unwrap();
        assert_eq!(parsed, Medium::Audio);
    }

    #[test]
    fn test_medium_from_str() {
        assert_eq!("VIDEO".parse::<Medium>().unwrap(), Medium::Video);
        assert!("podcast".parse::<Medium>().is_err());
        assert_eq!(Medium::Video.opposite(), Medium::Audio);
    }

    #[test]
    fn test_src_type_from_extension() {
        assert_eq!(SrcType::from_extension("mp4"), Some(SrcType::Video));
        assert_eq!(SrcType::from_extension(".M4A"), Some(SrcType::Audio));
        assert_eq!(SrcType::from_extension("webm"), Some(SrcType::Video));
        assert_eq!(SrcType::from_extension("unknown_video"), None);
    }

    #[test]
    fn test_media_metadata_accepts_approx_fields() {
        let meta: MediaMetadata = serde_json::from_value(json!({
            "title": "T",
            "ext": "mp4",
            "duration_approx": 125.7,
            "filesize_approx": 1048580
        }))
        .unwrap();

        assert_eq!(meta.duration_secs(), Some(126));
        assert_eq!(meta.size_bytes(), Some(1048580));
        assert_eq!(meta.classify(), Some(SrcType::Video));
        assert!(meta.url.is_none());
    }

    #[test]
    fn test_media_metadata_prefers_exact_values() {
        let meta: MediaMetadata = serde_json::from_value(json!({
            "duration": 10.2,
            "duration_approx": 99.0,
            "filesize": 10,
            "filesize_approx": 20,
            "uploader": "someone"
        }))
        .unwrap();

        assert_eq!(meta.duration_secs(), Some(10));
        assert_eq!(meta.size_bytes(), Some(10));
        assert_eq!(meta.author(), Some("someone"));
    }

    #[test]
    fn test_classify_falls_back_to_type_tag() {
        let meta = MediaMetadata {
            ext: Some("bin".into()),
            kind: Some("audio".into()),
            ..Default::default()
        };
        assert_eq!(meta.classify(), Some(SrcType::Audio));

        let unknown = MediaMetadata {
            ext: Some("bin".into()),
            kind: Some("playlist".into()),
            ..Default::default()
        };
        assert_eq!(unknown.classify(), None);
    }

    #[test]
    fn test_resolve_bookmark_payload_camel_case() {
        let payload: ResolveBookmarkPayload = serde_json::from_value(json!({
            "userId": "0190b5c4-7a4f-7000-8000-000000000001",
            "bookmarkId": "0190b5c4-7a4f-7000-8000-000000000002",
            "url": "https://example.com/post",
            "resolveBookmark": true,
            "resolveArchive": false,
            "resolveEpisode": true,
            "userProvidedMeta": { "title": "Mine", "tags": ["rust"] },
            "episodeId": "0190b5c4-7a4f-7000-8000-000000000003",
            "episodeMedium": "audio"
        }))
        .unwrap();

        assert!(payload.resolve_bookmark);
        assert!(!payload.resolve_archive);
        assert_eq!(payload.user_provided_meta.title.as_deref(), Some("Mine"));
        assert_eq!(payload.user_provided_meta.tags, vec!["rust".to_string()]);
        assert_eq!(payload.user_provided_meta.summary, None);
        assert_eq!(payload.episode_medium, Some(Medium::Audio));
        assert!(payload.archive_id.is_none());
    }

    #[test]
    fn test_job_state_round_trip_strings() {
        for state in [
            JobState::Created,
            JobState::Active,
            JobState::Completed,
            JobState::Retry,
            JobState::Failed,
            JobState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!(JobState::Retry.is_queued());
        assert!(JobState::Failed.is_settled());
        assert!(!JobState::Active.is_settled());
    }

    #[test]
    fn test_retry_delay_backoff() {
        assert_eq!(retry_delay_secs(30, true, 0), 30);
        assert_eq!(retry_delay_secs(30, true, 1), 60);
        assert_eq!(retry_delay_secs(30, true, 3), 240);
        assert_eq!(retry_delay_secs(30, true, 20), 3600);
        assert_eq!(retry_delay_secs(30, false, 5), 30);
    }

    #[test]
    fn test_queue_policy_overrides() {
        let policy = QueuePolicy::default().with_overrides(&QueueOverrides {
            retry_limit: Some(0),
            retention_secs: Some(60),
            ..Default::default()
        });

        assert_eq!(policy.retry_limit, 0);
        assert_eq!(policy.retention_secs, 60);
        assert_eq!(policy.retry_delay_secs, defaults::QUEUE_RETRY_DELAY_SECS);
        assert!(policy.retry_backoff);
    }
}
