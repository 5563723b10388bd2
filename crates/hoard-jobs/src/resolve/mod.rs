//! Entity resolvers and the orchestrator that fans out to them.
//!
//! Every resolver absorbs its own failures: the error is recorded on the
//! entity row where one exists, logged, and reported back as a
//! [`ResolveOutcome`]. Nothing past a resolver boundary is propagated.

mod archive;
mod bookmark;
mod episode;
mod handlers;
mod orchestrator;

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use hoard_core::{Error, PageDocument, Result};

pub use archive::ArchiveResolver;
pub use bookmark::{bookmark_update, merge_tags, BookmarkMetadataResolver};
pub use episode::{episode_update, DirectUrlCache, EpisodeResolver};
pub use handlers::{ResolveArchiveHandler, ResolveBookmarkHandler, ResolveEpisodeHandler};
pub use orchestrator::ResolutionOrchestrator;

/// One of the three resolution tasks a job can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveTask {
    Bookmark,
    Archive,
    Episode,
}

impl ResolveTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveTask::Bookmark => "bookmark",
            ResolveTask::Archive => "archive",
            ResolveTask::Episode => "episode",
        }
    }
}

impl fmt::Display for ResolveTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settled result of one resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub task: ResolveTask,
    pub result: std::result::Result<(), String>,
}

impl ResolveOutcome {
    pub fn ok(task: ResolveTask) -> Self {
        Self {
            task,
            result: Ok(()),
        }
    }

    pub fn failed(task: ResolveTask, error: impl Into<String>) -> Self {
        Self {
            task,
            result: Err(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }

    pub fn to_json(&self) -> JsonValue {
        match &self.result {
            Ok(()) => json!({ "task": self.task.as_str(), "ok": true }),
            Err(e) => json!({ "task": self.task.as_str(), "ok": false, "error": e }),
        }
    }
}

/// Aggregate of every resolver launched for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub outcomes: Vec<ResolveOutcome>,
    /// Set when the shared page fetch failed.
    pub shared_fetch_error: Option<String>,
}

impl ResolutionReport {
    pub fn push(&mut self, outcome: ResolveOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcome(&self, task: ResolveTask) -> Option<&ResolveOutcome> {
        self.outcomes.iter().find(|o| o.task == task)
    }

    pub fn succeeded(&self) -> Vec<&'static str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_ok())
            .map(|o| o.task.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<&'static str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_ok())
            .map(|o| o.task.as_str())
            .collect()
    }

    /// Job output stored on completion.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "succeeded": self.succeeded(),
            "failed": self.failed(),
            "outcomes": self.outcomes.iter().map(ResolveOutcome::to_json).collect::<Vec<_>>(),
            "sharedFetchError": self.shared_fetch_error,
        })
    }
}

/// Run a CPU-bound extractor over a shared document on the blocking pool.
pub(crate) async fn extract_blocking<T, F>(document: Arc<PageDocument>, extract: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&PageDocument) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || extract(&document))
        .await
        .map_err(|e| Error::Internal(format!("extraction task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_partitions_outcomes() {
        let mut report = ResolutionReport::default();
        report.push(ResolveOutcome::ok(ResolveTask::Archive));
        report.push(ResolveOutcome::failed(ResolveTask::Episode, "HTTP 500"));
        report.push(ResolveOutcome::ok(ResolveTask::Bookmark));

        assert_eq!(report.succeeded(), vec!["archive", "bookmark"]);
        assert_eq!(report.failed(), vec!["episode"]);
        assert_eq!(
            report.outcome(ResolveTask::Episode).and_then(|o| o.error()),
            Some("HTTP 500")
        );
    }

    #[test]
    fn test_report_json() {
        let mut report = ResolutionReport {
            shared_fetch_error: Some("HTTP 404".into()),
            ..Default::default()
        };
        report.push(ResolveOutcome::failed(ResolveTask::Archive, "HTTP 404"));

        let value = report.to_json();
        assert_eq!(value["failed"], json!(["archive"]));
        assert_eq!(value["sharedFetchError"], json!("HTTP 404"));
        assert_eq!(value["outcomes"][0]["ok"], json!(false));
    }

    #[tokio::test]
    async fn test_extract_blocking_passes_document() {
        let document = Arc::new(PageDocument {
            url: "https://example.com/".into(),
            final_url: "https://example.com/".into(),
            html: "<p>x</p>".into(),
        });
        let len = extract_blocking(document, |doc| Ok(doc.html.len()))
            .await
            .unwrap();
        assert_eq!(len, 8);
    }
}
