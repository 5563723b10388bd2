//! Page head metadata: title, summary and tags.

use scraper::Html;

use hoard_core::{Error, PageDocument, PageMetadata, PageMetadataExtractor, Result};

use crate::text::{first_text, meta_content, meta_contents};

const TITLE_SELECTORS: &[&str] = &[
    "meta[property='og:title']",
    "meta[name='twitter:title']",
];

const SUMMARY_SELECTORS: &[&str] = &[
    "meta[property='og:description']",
    "meta[name='description']",
    "meta[name='twitter:description']",
];

/// [`PageMetadataExtractor`] over `scraper`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScraperMetadataExtractor;

impl ScraperMetadataExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl PageMetadataExtractor for ScraperMetadataExtractor {
    fn extract(&self, document: &PageDocument) -> Result<PageMetadata> {
        if document.html.trim().is_empty() {
            return Err(Error::Parse(format!("empty document for {}", document.url)));
        }
        let doc = Html::parse_document(&document.html);

        let title =
            meta_content(&doc, TITLE_SELECTORS).or_else(|| first_text(&doc, "head > title"));
        let summary = meta_content(&doc, SUMMARY_SELECTORS);

        let mut tags: Vec<String> = meta_contents(&doc, "meta[name='keywords']")
            .iter()
            .flat_map(|keywords| keywords.split(','))
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        tags.extend(meta_contents(&doc, "meta[property='article:tag']"));

        Ok(PageMetadata {
            title,
            summary,
            tags,
        })
    }
}
