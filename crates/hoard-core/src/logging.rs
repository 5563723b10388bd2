//! Structured logging field names shared by every hoard crate.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Worker or queue infrastructure broken, needs an operator |
//! | WARN  | A resolver failed and recorded its error on the entity row |
//! | INFO  | Lifecycle events, one aggregate line per resolution job |
//! | DEBUG | Cache hits and misses, skipped sub-tasks, claim decisions |
//! | TRACE | Per-entry cache sweeps |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "db", "extract", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "worker", "orchestrator", "media_client", "result_cache"
pub const COMPONENT: &str = "component";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Queue name a job belongs to.
pub const QUEUE: &str = "queue";

/// Owning user of the entity being resolved.
pub const OWNER_ID: &str = "owner_id";

/// Bookmark UUID.
pub const BOOKMARK_ID: &str = "bookmark_id";

/// Archive UUID.
pub const ARCHIVE_ID: &str = "archive_id";

/// Episode UUID.
pub const EPISODE_ID: &str = "episode_id";

/// Source URL being resolved.
pub const URL: &str = "url";

/// Requested medium ("video", "audio").
pub const MEDIUM: &str = "medium";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Cache outcome ("hit", "miss").
pub const CACHE: &str = "cache";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Resolution tasks that succeeded.
pub const SUCCEEDED: &str = "succeeded";

/// Resolution tasks that failed.
pub const FAILED: &str = "failed";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
