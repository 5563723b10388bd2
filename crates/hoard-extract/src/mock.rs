//! Test doubles for the extraction collaborators.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hoard_extract::mock::{MockMediaResolver, MockPageFetcher};
//!
//! let media = MockMediaResolver::new().with_metadata("https://v.example/1", metadata);
//! let pages = MockPageFetcher::new().with_page("https://blog.example/post", "<html>..</html>");
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use hoard_core::{
    Error, MediaMetadata, MediaResolver, Medium, PageDocument, PageFetcher, PageMetadata,
    PageMetadataExtractor, ReadabilityExtractor, ReadableArticle, Result,
};

#[derive(Debug, Clone)]
enum MockMedia {
    Metadata(MediaMetadata),
    Failure { status: u16, body: String },
}

/// Media resolver answering from a table keyed by source URL.
///
/// Unknown URLs fail with a 404 extraction error.
#[derive(Clone, Default)]
pub struct MockMediaResolver {
    responses: Arc<HashMap<String, MockMedia>>,
    calls: Arc<Mutex<Vec<(String, Medium)>>>,
}

impl MockMediaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, url: impl Into<String>, metadata: MediaMetadata) -> Self {
        Arc::make_mut(&mut self.responses).insert(url.into(), MockMedia::Metadata(metadata));
        self
    }

    pub fn with_failure(
        mut self,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.responses).insert(
            url.into(),
            MockMedia::Failure {
                status,
                body: body.into(),
            },
        );
        self
    }

    /// Every `(url, medium)` resolved so far.
    pub fn calls(&self) -> Vec<(String, Medium)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaResolver for MockMediaResolver {
    async fn resolve(&self, url: &str, medium: Medium) -> Result<MediaMetadata> {
        self.calls.lock().unwrap().push((url.to_string(), medium));
        match self.responses.get(url) {
            Some(MockMedia::Metadata(metadata)) => {
                let mut metadata = metadata.clone();
                metadata.src_type = metadata.classify();
                Ok(metadata)
            }
            Some(MockMedia::Failure { status, body }) => Err(Error::Extraction {
                status: *status,
                body: body.clone(),
            }),
            None => Err(Error::Extraction {
                status: 404,
                body: format!("no mock response for {}", url),
            }),
        }
    }
}

/// Page fetcher serving canned HTML.
///
/// Unknown URLs fail with a fetch error.
#[derive(Clone, Default)]
pub struct MockPageFetcher {
    pages: Arc<HashMap<String, String>>,
    latency: Duration,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.pages).insert(url.into(), html.into());
        self
    }

    /// Delay every fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn fetch(&self, url: &str) -> Result<PageDocument> {
        self.calls.lock().unwrap().push(url.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.pages.get(url) {
            Some(html) => Ok(PageDocument {
                url: url.to_string(),
                final_url: url.to_string(),
                html: html.clone(),
            }),
            None => Err(Error::Fetch(format!("HTTP 404 Not Found for {}", url))),
        }
    }
}

/// Records the address of each document's HTML buffer, so tests can tell
/// whether two extractors were handed the same fetched document.
#[derive(Clone, Default)]
pub struct DocumentLog {
    seen: Arc<Mutex<Vec<usize>>>,
}

impl DocumentLog {
    fn record(&self, document: &PageDocument) {
        self.seen
            .lock()
            .unwrap()
            .push(document.html.as_ptr() as usize);
    }

    pub fn addresses(&self) -> Vec<usize> {
        self.seen.lock().unwrap().clone()
    }
}

/// Readability extractor returning a fixed article, or failing.
#[derive(Clone, Default)]
pub struct StaticReadability {
    article: Option<ReadableArticle>,
    log: DocumentLog,
}

impl StaticReadability {
    pub fn new(article: ReadableArticle) -> Self {
        Self {
            article: Some(article),
            log: DocumentLog::default(),
        }
    }

    /// An extractor that rejects every document.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn log(&self) -> DocumentLog {
        self.log.clone()
    }
}

impl ReadabilityExtractor for StaticReadability {
    fn extract(&self, document: &PageDocument) -> Result<ReadableArticle> {
        self.log.record(document);
        self.article
            .clone()
            .ok_or_else(|| Error::Parse(format!("no readable content in {}", document.url)))
    }
}

/// Metadata extractor returning fixed metadata.
#[derive(Clone, Default)]
pub struct StaticMetadata {
    metadata: PageMetadata,
    log: DocumentLog,
}

impl StaticMetadata {
    pub fn new(metadata: PageMetadata) -> Self {
        Self {
            metadata,
            log: DocumentLog::default(),
        }
    }

    pub fn log(&self) -> DocumentLog {
        self.log.clone()
    }
}

impl PageMetadataExtractor for StaticMetadata {
    fn extract(&self, document: &PageDocument) -> Result<PageMetadata> {
        self.log.record(document);
        Ok(self.metadata.clone())
    }
}
