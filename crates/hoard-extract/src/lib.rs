//! # hoard-extract
//!
//! Outbound extraction for hoard: the media extraction service client,
//! page fetching, and HTML extraction for archive snapshots and bookmark
//! metadata.
//!
//! HTML parsing is synchronous and `scraper::Html` is not `Send`, so the
//! extractors work on a raw [`hoard_core::PageDocument`] and are meant to be
//! called from a blocking thread.

pub mod config;
pub mod media;
pub mod metadata;
pub mod page;
pub mod readability;
pub mod text;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::{MediaExtractorConfig, PageFetcherConfig};
pub use media::{format_preference, MediaExtractionClient, MetadataCache};
pub use metadata::ScraperMetadataExtractor;
pub use page::HttpPageFetcher;
pub use readability::ScraperReadability;
pub use text::{clean_field, collapse_whitespace, truncate_chars};
