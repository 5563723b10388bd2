//! Fan-out of one `resolve-bookmark` job to the entity resolvers.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use hoard_core::{PageFetcher, ResolveBookmarkPayload};

use super::{
    ArchiveResolver, BookmarkMetadataResolver, EpisodeResolver, ResolutionReport,
    ResolveOutcome, ResolveTask,
};

/// Runs the resolvers a `resolve-bookmark` job asks for.
///
/// The bookmark URL is fetched at most once and shared between the bookmark
/// resolver and an archive of the same URL. The episode resolver runs alongside without the page.
/// Every launched resolver is awaited; one failing never cancels another.
#[derive(Clone)]
pub struct ResolutionOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    bookmarks: BookmarkMetadataResolver,
    archives: ArchiveResolver,
    episodes: EpisodeResolver,
}

/// Spawn a resolver so that a panic still settles as a failed outcome.
fn spawn_settled<F>(tasks: &mut JoinSet<ResolveOutcome>, task: ResolveTask, fut: F)
where
    F: Future<Output = ResolveOutcome> + Send + 'static,
{
    tasks.spawn(async move {
        AssertUnwindSafe(fut)
            .catch_unwind()
            .await
            .unwrap_or_else(|_| ResolveOutcome::failed(task, format!("{} resolver panicked", task)))
    });
}

impl ResolutionOrchestrator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        bookmarks: BookmarkMetadataResolver,
        archives: ArchiveResolver,
        episodes: EpisodeResolver,
    ) -> Self {
        Self {
            fetcher,
            bookmarks,
            archives,
            episodes,
        }
    }

    #[instrument(skip(self, payload), fields(owner_id = %payload.user_id, bookmark_id = %payload.bookmark_id))]
    pub async fn run(&self, payload: &ResolveBookmarkPayload) -> ResolutionReport {
        let start = Instant::now();
        let mut report = ResolutionReport::default();
        let mut tasks = JoinSet::new();
        let owner_id = payload.user_id;

        if payload.resolve_episode {
            match payload.episode_id {
                Some(episode_id) => {
                    let episodes = self.episodes.clone();
                    let url = payload.episode_url.clone().unwrap_or_else(|| payload.url.clone());
                    let medium = payload.episode_medium.unwrap_or_default();
                    let bookmark_title = payload.user_provided_meta.title.clone();
                    spawn_settled(&mut tasks, ResolveTask::Episode, async move {
                        episodes
                            .resolve(owner_id, episode_id, bookmark_title.as_deref(), &url, medium)
                            .await
                    });
                }
                None => report.push(ResolveOutcome::failed(
                    ResolveTask::Episode,
                    "episode resolution requested without an episodeId",
                )),
            }
        }

        let archive = if payload.resolve_archive {
            match payload.archive_id {
                Some(archive_id) => Some((
                    archive_id,
                    payload.archive_url.clone().unwrap_or_else(|| payload.url.clone()),
                )),
                None => {
                    report.push(ResolveOutcome::failed(
                        ResolveTask::Archive,
                        "archive resolution requested without an archiveId",
                    ));
                    None
                }
            }
        } else {
            None
        };

        // An archive of a different page fetches for itself.
        let (shared_archive, own_archive) = match archive {
            Some((archive_id, url)) if url == payload.url => (Some((archive_id, url)), None),
            other => (None, other),
        };

        if let Some((archive_id, url)) = own_archive {
            let archives = self.archives.clone();
            spawn_settled(&mut tasks, ResolveTask::Archive, async move {
                archives.resolve(owner_id, archive_id, &url, None).await
            });
        }

        if payload.resolve_bookmark || shared_archive.is_some() {
            match self.fetcher.fetch(&payload.url).await {
                Ok(document) => {
                    let document = Arc::new(document);

                    if payload.resolve_bookmark {
                        let bookmarks = self.bookmarks.clone();
                        let document = document.clone();
                        let bookmark_id = payload.bookmark_id;
                        let url = payload.url.clone();
                        let user = payload.user_provided_meta.clone();
                        spawn_settled(&mut tasks, ResolveTask::Bookmark, async move {
                            bookmarks
                                .resolve(owner_id, bookmark_id, &url, &user, document)
                                .await
                        });
                    }

                    if let Some((archive_id, url)) = shared_archive {
                        let archives = self.archives.clone();
                        spawn_settled(&mut tasks, ResolveTask::Archive, async move {
                            archives
                                .resolve(owner_id, archive_id, &url, Some(document))
                                .await
                        });
                    }
                }
                Err(e) => {
                    let message = e.report();
                    warn!(url = %payload.url, error = %message, "Shared page fetch failed");

                    if payload.resolve_bookmark {
                        report.push(ResolveOutcome::failed(ResolveTask::Bookmark, message.clone()));
                    }
                    if let Some((archive_id, url)) = shared_archive {
                        report.push(
                            self.archives
                                .record_failure(owner_id, archive_id, &url, &e)
                                .await,
                        );
                    }
                    report.shared_fetch_error = Some(message);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.push(outcome),
                Err(e) => error!(error = %e, "Resolver task did not finish"),
            }
        }

        info!(
            succeeded = ?report.succeeded(),
            failed = ?report.failed(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Resolution finished"
        );
        report
    }
}
