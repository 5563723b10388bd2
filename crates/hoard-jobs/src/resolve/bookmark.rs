//! Bookmark-Metadata Resolver: title, summary and tags from the page head.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use hoard_core::defaults::{SUMMARY_MAX_LEN, TITLE_MAX_LEN};
use hoard_core::{
    BookmarkRepository, BookmarkUpdate, PageDocument, PageMetadata, PageMetadataExtractor,
    Result, UserProvidedMeta,
};
use hoard_extract::clean_field;

use super::{extract_blocking, ResolveOutcome, ResolveTask};

/// Fills in bookmark title, summary and tags from the fetched page.
///
/// Values the user typed in win over extracted ones.
#[derive(Clone)]
pub struct BookmarkMetadataResolver {
    bookmarks: Arc<dyn BookmarkRepository>,
    extractor: Arc<dyn PageMetadataExtractor>,
}

impl BookmarkMetadataResolver {
    pub fn new(
        bookmarks: Arc<dyn BookmarkRepository>,
        extractor: Arc<dyn PageMetadataExtractor>,
    ) -> Self {
        Self {
            bookmarks,
            extractor,
        }
    }

    pub async fn resolve(
        &self,
        owner_id: Uuid,
        bookmark_id: Uuid,
        url: &str,
        user: &UserProvidedMeta,
        document: Arc<PageDocument>,
    ) -> ResolveOutcome {
        match self.try_resolve(owner_id, bookmark_id, user, document).await {
            Ok(()) => ResolveOutcome::ok(ResolveTask::Bookmark),
            Err(e) => {
                let report = e.report();
                warn!(%owner_id, %bookmark_id, url, error = %report, "Bookmark metadata resolution failed");
                ResolveOutcome::failed(ResolveTask::Bookmark, report)
            }
        }
    }

    async fn try_resolve(
        &self,
        owner_id: Uuid,
        bookmark_id: Uuid,
        user: &UserProvidedMeta,
        document: Arc<PageDocument>,
    ) -> Result<()> {
        let extractor = self.extractor.clone();
        let extracted = extract_blocking(document, move |doc| extractor.extract(doc)).await?;

        let update = bookmark_update(user, extracted);
        if update.is_empty() {
            debug!(%bookmark_id, "Nothing to update on bookmark");
            return Ok(());
        }
        self.bookmarks
            .apply_metadata(owner_id, bookmark_id, &update)
            .await
    }
}

fn user_supplied(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Extracted values the bookmark should take.
pub fn bookmark_update(user: &UserProvidedMeta, extracted: PageMetadata) -> BookmarkUpdate {
    let title = if user_supplied(&user.title) {
        None
    } else {
        extracted
            .title
            .as_deref()
            .and_then(|t| clean_field(t, TITLE_MAX_LEN))
    };

    let summary = if user_supplied(&user.summary) {
        None
    } else {
        extracted
            .summary
            .as_deref()
            .and_then(|s| clean_field(s, SUMMARY_MAX_LEN))
    };

    let tags = if extracted.tags.is_empty() {
        None
    } else {
        Some(merge_tags(&user.tags, &extracted.tags))
    };

    BookmarkUpdate {
        title,
        summary,
        tags,
    }
}

/// Union of both tag lists in first-seen order, compared case-insensitively.
pub fn merge_tags(user: &[String], extracted: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    user.iter()
        .chain(extracted)
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .map(str::to_string)
        .collect()
}
