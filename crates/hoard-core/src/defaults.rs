//! Centralized default constants for hoard.
//!
//! Every crate reads its fallback values from here instead of defining its
//! own magic numbers. Environment variables documented next to each config
//! struct override these at runtime.

// =============================================================================
// SERVER
// =============================================================================

/// Default bind address.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default database URL when `DATABASE_URL` is unset.
pub const DATABASE_URL: &str = "postgres://localhost/hoard";

// =============================================================================
// DATABASE POOL
// =============================================================================

/// Maximum pool connections.
pub const POOL_MAX_CONNECTIONS: u32 = 10;

/// Minimum idle pool connections.
pub const POOL_MIN_CONNECTIONS: u32 = 1;

/// Seconds to wait for a pooled connection.
pub const POOL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds before an idle connection is closed.
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 600;

/// Maximum connection lifetime in seconds.
pub const POOL_MAX_LIFETIME_SECS: u64 = 1800;

// =============================================================================
// MEDIA EXTRACTION
// =============================================================================

/// Base URL of the media extraction service. Userinfo carries basic auth.
pub const MEDIA_EXTRACTOR_URL: &str = "http://localhost:5000/";

/// Timeout for a single extraction request.
pub const MEDIA_EXTRACTOR_TIMEOUT_SECS: u64 = 60;

/// Preferred containers for video episodes, best first.
pub const VIDEO_CONTAINERS: &[&str] = &["mp4", "mov", "m4v"];

/// Preferred containers for audio episodes, best first.
pub const AUDIO_CONTAINERS: &[&str] = &["m4a", "mp3", "aac", "ogg", "opus"];

/// Extensions classified as audio when deriving `src_type`.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "aac", "ogg", "oga", "opus", "wav", "flac", "weba",
];

/// Extensions classified as video when deriving `src_type`.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "webm", "mkv", "avi", "3gp"];

// =============================================================================
// PAGE FETCHING
// =============================================================================

/// Timeout for fetching a bookmarked page.
pub const PAGE_FETCH_TIMEOUT_SECS: u64 = 15;

/// Maximum redirects followed when fetching a page.
pub const PAGE_FETCH_MAX_REDIRECTS: usize = 10;

/// Largest page body read before a fetch is abandoned (5 MiB).
pub const PAGE_FETCH_MAX_BYTES: usize = 5 * 1024 * 1024;

/// User agent sent with page fetches.
pub const PAGE_FETCH_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// =============================================================================
// RESULT CACHE
// =============================================================================

/// Maximum entries per result cache before LRU eviction.
pub const RESULT_CACHE_MAX_ENTRIES: usize = 200;

/// Absolute time-to-live of a cache entry, from insertion.
pub const RESULT_CACHE_TTL_SECS: u64 = 600;

/// Interval of the background expired-entry sweep.
pub const RESULT_CACHE_PURGE_INTERVAL_SECS: u64 = 60;

// =============================================================================
// STORAGE LIMITS
// =============================================================================

/// Column limit for bookmark and episode titles.
pub const TITLE_MAX_LEN: usize = 255;

/// Column limit for the extracted bookmark summary.
pub const SUMMARY_MAX_LEN: usize = 500;

/// Characters of article text kept as the archive excerpt when the page has
/// no description of its own.
pub const EXCERPT_MAX_LEN: usize = 300;

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Default retry limit for a queue.
pub const QUEUE_RETRY_LIMIT: i32 = 3;

/// Base retry delay in seconds.
pub const QUEUE_RETRY_DELAY_SECS: i32 = 30;

/// Exponential backoff enabled by default.
pub const QUEUE_RETRY_BACKOFF: bool = true;

/// Upper bound for a backed-off retry delay (one hour).
pub const QUEUE_RETRY_DELAY_MAX_SECS: i64 = 3600;

/// How long jobs are kept before maintenance deletes them (7 days).
pub const QUEUE_RETENTION_SECS: i32 = 7 * 24 * 60 * 60;

/// How long a job may stay active before it is considered abandoned.
pub const QUEUE_EXPIRE_SECS: i32 = 15 * 60;

/// Window used by the re-trigger endpoints to collapse bursts.
pub const RETRIGGER_THROTTLE_SECS: i32 = 60;

// =============================================================================
// JOB WORKER
// =============================================================================

/// Whether the in-process worker starts by default.
pub const JOB_WORKER_ENABLED: bool = true;

/// Concurrent job slots.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Poll interval when the queues are empty.
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Interval between queue maintenance runs.
pub const JOB_MAINTENANCE_INTERVAL_SECS: u64 = 60;

/// Per-job execution timeout.
pub const JOB_TIMEOUT_SECS: u64 = 300;

/// Capacity of the worker event broadcast channel.
pub const WORKER_EVENT_CAPACITY: usize = 100;
