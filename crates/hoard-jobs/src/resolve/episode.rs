//! Episode Resolver: playable media details for episode rows.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use hoard_core::defaults::TITLE_MAX_LEN;
use hoard_core::{
    DirectUrlKey, EpisodeRepository, EpisodeUpdate, MediaMetadata, MediaResolver, Medium,
    Result, ResultCache,
};
use hoard_extract::{clean_field, collapse_whitespace};

use super::{ResolveOutcome, ResolveTask};

/// Direct media URLs keyed by the persisted episode identity.
pub type DirectUrlCache = ResultCache<DirectUrlKey, String>;

/// Resolves playable media for episode rows.
///
/// A failed episode keeps `ready = false` so it is never advertised as
/// playable.
#[derive(Clone)]
pub struct EpisodeResolver {
    episodes: Arc<dyn EpisodeRepository>,
    media: Arc<dyn MediaResolver>,
    direct_urls: DirectUrlCache,
}

impl EpisodeResolver {
    pub fn new(
        episodes: Arc<dyn EpisodeRepository>,
        media: Arc<dyn MediaResolver>,
        direct_urls: DirectUrlCache,
    ) -> Self {
        Self {
            episodes,
            media,
            direct_urls,
        }
    }

    pub async fn resolve(
        &self,
        owner_id: Uuid,
        episode_id: Uuid,
        bookmark_title: Option<&str>,
        url: &str,
        medium: Medium,
    ) -> ResolveOutcome {
        let start = Instant::now();
        match self
            .try_resolve(owner_id, episode_id, bookmark_title, url, medium)
            .await
        {
            Ok(()) => {
                info!(
                    %owner_id,
                    %episode_id,
                    url,
                    %medium,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Episode resolved"
                );
                ResolveOutcome::ok(ResolveTask::Episode)
            }
            Err(e) => {
                let report = e.report();
                warn!(%owner_id, %episode_id, url, %medium, error = %report, "Episode resolution failed");
                if let Err(db_err) = self.episodes.mark_failed(owner_id, episode_id, &report).await
                {
                    error!(%owner_id, %episode_id, error = %db_err, "Failed to record episode failure");
                }
                ResolveOutcome::failed(ResolveTask::Episode, report)
            }
        }
    }

    async fn try_resolve(
        &self,
        owner_id: Uuid,
        episode_id: Uuid,
        bookmark_title: Option<&str>,
        url: &str,
        medium: Medium,
    ) -> Result<()> {
        let metadata = self.media.resolve(url, medium).await?;
        let update = episode_update(url, bookmark_title, &metadata);
        let resolved = self
            .episodes
            .apply_resolution(owner_id, episode_id, &update)
            .await?;

        if let Some(direct_url) = metadata.url.filter(|u| !u.is_empty()) {
            let key = DirectUrlKey {
                owner_id,
                episode_id,
                url: url.to_string(),
                entity_type: resolved.entity_type,
                medium: resolved.medium,
            };
            self.direct_urls.set(key, direct_url).await;
            debug!(%episode_id, "Direct URL cache warmed");
        }
        Ok(())
    }
}

/// Columns to write for a successful extraction.
///
/// The extracted title is only used when it differs from the bookmark's.
pub fn episode_update(
    url: &str,
    bookmark_title: Option<&str>,
    metadata: &MediaMetadata,
) -> EpisodeUpdate {
    let bookmark_title = bookmark_title.map(collapse_whitespace);
    let title = metadata
        .title
        .as_deref()
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty() && Some(t) != bookmark_title.as_ref())
        .and_then(|t| clean_field(&t, TITLE_MAX_LEN));

    EpisodeUpdate {
        url: url.to_string(),
        title,
        size_in_bytes: metadata.size_bytes(),
        duration_in_seconds: metadata.duration_secs(),
        author: metadata.author().map(str::to_string),
        filename: metadata.filename.clone(),
        ext: metadata.ext.clone(),
        src_type: metadata.src_type.or_else(|| metadata.classify()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_core::SrcType;

    fn metadata() -> MediaMetadata {
        MediaMetadata {
            title: Some("T".into()),
            ext: Some("mp4".into()),
            duration_approx: Some(125.7),
            filesize_approx: Some(1048580.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_update_from_approximate_values() {
        let update = episode_update("https://v.example/1", None, &metadata());

        assert_eq!(update.url, "https://v.example/1");
        assert_eq!(update.title.as_deref(), Some("T"));
        assert_eq!(update.duration_in_seconds, Some(126));
        assert_eq!(update.size_in_bytes, Some(1048580));
        assert_eq!(update.ext.as_deref(), Some("mp4"));
        assert_eq!(update.src_type, Some(SrcType::Video));
        assert!(update.author.is_none());
        assert!(update.filename.is_none());
    }

    #[test]
    fn test_title_matching_bookmark_is_skipped() {
        let update = episode_update("https://v.example/1", Some("  T "), &metadata());
        assert!(update.title.is_none());

        let update = episode_update("https://v.example/1", Some("Other"), &metadata());
        assert_eq!(update.title.as_deref(), Some("T"));
    }

    #[test]
    fn test_long_title_is_truncated() {
        let long = MediaMetadata {
            title: Some("x".repeat(400)),
            ..Default::default()
        };
        let update = episode_update("https://v.example/1", None, &long);
        assert_eq!(update.title.map(|t| t.chars().count()), Some(TITLE_MAX_LEN));
    }

    #[test]
    fn test_author_prefers_channel() {
        let meta = MediaMetadata {
            channel: Some("Channel".into()),
            uploader: Some("Uploader".into()),
            ..Default::default()
        };
        let update = episode_update("u", None, &meta);
        assert_eq!(update.author.as_deref(), Some("Channel"));
        assert!(update.src_type.is_none());
    }
}
