//! # hoard-jobs
//!
//! Durable background resolution for hoard.
//!
//! This crate provides:
//! - Typed queue handles over a [`hoard_core::JobRepository`]
//! - A worker pool with retry, timeouts and periodic queue maintenance
//! - The archive, episode and bookmark-metadata resolvers
//! - The orchestrator that fans a `resolve-bookmark` job out to them
//!
//! ## Example
//!
//! ```ignore
//! use hoard_jobs::{register_queues, ResolveBookmarkHandler, WorkerBuilder, WorkerConfig};
//!
//! let queues = register_queues(repo.clone()).await?;
//!
//! let worker = WorkerBuilder::new(repo)
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(ResolveBookmarkHandler::new(orchestrator))
//!     .build()
//!     .await;
//!
//! let handle = worker.start();
//! handle.shutdown().await?;
//! ```

pub mod handler;
pub mod queues;
pub mod resolve;
pub mod worker;

// Re-export core types
pub use hoard_core::*;

pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler};
pub use queues::{
    register_queues, Queue, ResolutionQueues, ResolutionTriggers, RESOLVE_ARCHIVE,
    RESOLVE_BOOKMARK, RESOLVE_EPISODE,
};
pub use resolve::{
    bookmark_update, episode_update, merge_tags, ArchiveResolver, BookmarkMetadataResolver,
    DirectUrlCache, EpisodeResolver, ResolutionOrchestrator, ResolutionReport,
    ResolveArchiveHandler, ResolveBookmarkHandler, ResolveEpisodeHandler, ResolveOutcome,
    ResolveTask,
};
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};

/// Default polling interval for job processing (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = hoard_core::defaults::JOB_POLL_INTERVAL_MS;
