//! Archive Resolver: readable snapshots of bookmarked pages.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use hoard_core::{
    ArchiveRepository, Error, PageDocument, PageFetcher, ReadabilityExtractor, Result,
};

use super::{extract_blocking, ResolveOutcome, ResolveTask};

/// Produces readable snapshots for archive rows.
///
/// The archive row is always left terminal: on failure the error is stored
/// and the row is still marked ready.
#[derive(Clone)]
pub struct ArchiveResolver {
    archives: Arc<dyn ArchiveRepository>,
    fetcher: Arc<dyn PageFetcher>,
    readability: Arc<dyn ReadabilityExtractor>,
}

impl ArchiveResolver {
    pub fn new(
        archives: Arc<dyn ArchiveRepository>,
        fetcher: Arc<dyn PageFetcher>,
        readability: Arc<dyn ReadabilityExtractor>,
    ) -> Self {
        Self {
            archives,
            fetcher,
            readability,
        }
    }

    /// Snapshot `url` into the archive. Uses `shared` when given, otherwise
    /// fetches the page.
    pub async fn resolve(
        &self,
        owner_id: Uuid,
        archive_id: Uuid,
        url: &str,
        shared: Option<Arc<PageDocument>>,
    ) -> ResolveOutcome {
        let start = Instant::now();
        match self.try_resolve(owner_id, archive_id, url, shared).await {
            Ok(()) => {
                info!(
                    %owner_id,
                    %archive_id,
                    url,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Archive resolved"
                );
                ResolveOutcome::ok(ResolveTask::Archive)
            }
            Err(e) => self.record_failure(owner_id, archive_id, url, &e).await,
        }
    }

    /// Store `err` on the archive and mark it terminal.
    pub async fn record_failure(
        &self,
        owner_id: Uuid,
        archive_id: Uuid,
        url: &str,
        err: &Error,
    ) -> ResolveOutcome {
        let report = err.report();
        warn!(%owner_id, %archive_id, url, error = %report, "Archive resolution failed");
        if let Err(db_err) = self.archives.mark_failed(owner_id, archive_id, &report).await {
            error!(%owner_id, %archive_id, error = %db_err, "Failed to record archive failure");
        }
        ResolveOutcome::failed(ResolveTask::Archive, report)
    }

    async fn try_resolve(
        &self,
        owner_id: Uuid,
        archive_id: Uuid,
        url: &str,
        shared: Option<Arc<PageDocument>>,
    ) -> Result<()> {
        let document = match shared {
            Some(document) => document,
            None => Arc::new(self.fetcher.fetch(url).await?),
        };

        let readability = self.readability.clone();
        let article = extract_blocking(document, move |doc| readability.extract(doc)).await?;

        self.archives
            .store_snapshot(owner_id, archive_id, &article)
            .await
    }
}
