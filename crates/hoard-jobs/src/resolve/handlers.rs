//! Job handlers for the three resolution queues.

use async_trait::async_trait;
use tracing::warn;

use hoard_core::{ResolveArchivePayload, ResolveBookmarkPayload, ResolveEpisodePayload};

use super::{ArchiveResolver, EpisodeResolver, ResolutionOrchestrator};
use crate::handler::{JobContext, JobHandler, JobResult};
use crate::queues::{RESOLVE_ARCHIVE, RESOLVE_BOOKMARK, RESOLVE_EPISODE};

/// Consumes `resolve-bookmark`. Completes for every well-formed payload;
/// resolver failures live on the entity rows, not the job.
pub struct ResolveBookmarkHandler {
    orchestrator: ResolutionOrchestrator,
}

impl ResolveBookmarkHandler {
    pub fn new(orchestrator: ResolutionOrchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobHandler for ResolveBookmarkHandler {
    fn queue(&self) -> &str {
        RESOLVE_BOOKMARK
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let payload: ResolveBookmarkPayload = match ctx.payload() {
            Ok(p) => p,
            Err(e) => {
                warn!(job_id = %ctx.job_id(), error = %e, "Rejected resolve-bookmark payload");
                return JobResult::Failed(e.to_string());
            }
        };
        let report = self.orchestrator.run(&payload).await;
        JobResult::Success(Some(report.to_json()))
    }
}

/// Consumes `resolve-archive`: re-snapshots one archive, fetching the page
/// itself.
pub struct ResolveArchiveHandler {
    resolver: ArchiveResolver,
}

impl ResolveArchiveHandler {
    pub fn new(resolver: ArchiveResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl JobHandler for ResolveArchiveHandler {
    fn queue(&self) -> &str {
        RESOLVE_ARCHIVE
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let payload: ResolveArchivePayload = match ctx.payload() {
            Ok(p) => p,
            Err(e) => return JobResult::Failed(e.to_string()),
        };
        let outcome = self
            .resolver
            .resolve(payload.user_id, payload.archive_id, &payload.url, None)
            .await;
        JobResult::Success(Some(outcome.to_json()))
    }
}

/// Consumes `resolve-episode`.
pub struct ResolveEpisodeHandler {
    resolver: EpisodeResolver,
}

impl ResolveEpisodeHandler {
    pub fn new(resolver: EpisodeResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl JobHandler for ResolveEpisodeHandler {
    fn queue(&self) -> &str {
        RESOLVE_EPISODE
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let payload: ResolveEpisodePayload = match ctx.payload() {
            Ok(p) => p,
            Err(e) => return JobResult::Failed(e.to_string()),
        };
        let outcome = self
            .resolver
            .resolve(
                payload.user_id,
                payload.episode_id,
                payload.bookmark_title.as_deref(),
                &payload.url,
                payload.medium,
            )
            .await;
        JobResult::Success(Some(outcome.to_json()))
    }
}
