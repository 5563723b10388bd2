//! Readable-mode extraction for archive snapshots.
//!
//! Picks the main content region of a page, strips navigation and other
//! boilerplate, and reports the cleaned HTML alongside its plain text and
//! the page's descriptive fields.

use scraper::node::Element;
use scraper::{ElementRef, Html, Node};
use url::Url;

use hoard_core::defaults::EXCERPT_MAX_LEN;
use hoard_core::{Error, PageDocument, ReadabilityExtractor, ReadableArticle, Result};

use crate::text::{
    collapse_whitespace, first_attr, first_text, meta_content, selector, truncate_chars,
};

/// Candidate content regions, most specific first.
const MAIN_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    "#content",
    "#main",
    ".post-content",
    ".entry-content",
    ".article-body",
    ".content",
];

const BOILERPLATE_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "iframe", "form",
    "template", "svg",
];

const BOILERPLATE_MARKERS: &[&str] = &[
    "nav",
    "navbar",
    "header",
    "footer",
    "sidebar",
    "menu",
    "advertisement",
    "ads",
    "cookie-banner",
    "share",
];

const BOILERPLATE_SELECTORS: &[&str] = &[
    "nav",
    "header",
    "footer",
    "aside",
    "script",
    "style",
    "noscript",
    "iframe",
    "form",
    "template",
    "svg",
    ".nav",
    ".navbar",
    ".header",
    ".footer",
    ".sidebar",
    ".menu",
    ".advertisement",
    ".ads",
    ".share",
    "#nav",
    "#header",
    "#footer",
    "#sidebar",
];

const TITLE_SELECTORS: &[&str] = &["meta[property='og:title']", "meta[name='twitter:title']"];

const EXCERPT_SELECTORS: &[&str] = &[
    "meta[property='og:description']",
    "meta[name='description']",
    "meta[name='twitter:description']",
];

/// [`ReadabilityExtractor`] over `scraper`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScraperReadability;

impl ScraperReadability {
    pub fn new() -> Self {
        Self
    }
}

fn is_boilerplate(element: &Element) -> bool {
    if BOILERPLATE_TAGS.contains(&element.name()) {
        return true;
    }
    if element.attr("role") == Some("navigation") || element.attr("aria-hidden") == Some("true")
    {
        return true;
    }
    let marked = |token: &str| BOILERPLATE_MARKERS.contains(&token.to_ascii_lowercase().as_str());
    element.classes().any(marked) || element.id().is_some_and(marked)
}

/// Append the visible text under `element`, skipping boilerplate subtrees.
fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(&text.text);
                out.push(' ');
            }
            Node::Element(el) if !is_boilerplate(el) => {
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, out);
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn readable_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);
    collapse_whitespace(&raw)
}

/// Serialized HTML of `element` with boilerplate descendants removed.
fn cleaned_html(element: ElementRef<'_>) -> String {
    let mut html = element.html();
    for css in BOILERPLATE_SELECTORS {
        let Some(sel) = selector(css) else { continue };
        for unwanted in element.select(&sel) {
            let fragment = unwanted.html();
            if html.contains(&fragment) {
                html = html.replacen(&fragment, "", 1);
            }
        }
    }
    html
}

/// First candidate region with readable text, falling back to `<body>`.
fn main_region(doc: &Html) -> Option<(ElementRef<'_>, String)> {
    let candidates = MAIN_SELECTORS
        .iter()
        .chain(std::iter::once(&"body"))
        .filter_map(|css| selector(css));

    for sel in candidates {
        if let Some(el) = doc.select(&sel).next() {
            let text = readable_text(el);
            if !text.is_empty() {
                return Some((el, text));
            }
        }
    }
    None
}

fn site_name(doc: &Html, document: &PageDocument) -> Option<String> {
    meta_content(doc, &["meta[property='og:site_name']"]).or_else(|| {
        Url::parse(&document.final_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
    })
}

fn byline(doc: &Html) -> Option<String> {
    meta_content(doc, &["meta[name='author']", "meta[property='article:author']"])
        .or_else(|| first_text(doc, "[rel='author']"))
        .or_else(|| first_text(doc, "[itemprop='author']"))
        .or_else(|| first_text(doc, ".byline"))
}

impl ReadabilityExtractor for ScraperReadability {
    fn extract(&self, document: &PageDocument) -> Result<ReadableArticle> {
        let doc = Html::parse_document(&document.html);

        let (region, text) = main_region(&doc).ok_or_else(|| {
            Error::Parse(format!("no readable content in {}", document.final_url))
        })?;

        let title = meta_content(&doc, TITLE_SELECTORS)
            .or_else(|| first_text(&doc, "head > title"))
            .or_else(|| first_text(&doc, "h1"));

        let excerpt = meta_content(&doc, EXCERPT_SELECTORS)
            .unwrap_or_else(|| truncate_chars(&text, EXCERPT_MAX_LEN));

        let direction = first_attr(&doc, "html[dir]", "dir")
            .or_else(|| first_attr(&doc, "body[dir]", "dir"));
        let language = first_attr(&doc, "html[lang]", "lang")
            .or_else(|| meta_content(&doc, &["meta[http-equiv='content-language']"]));

        Ok(ReadableArticle {
            title,
            site_name: site_name(&doc, document),
            content: Some(cleaned_html(region)),
            length: Some(i32::try_from(text.chars().count()).unwrap_or(i32::MAX)),
            text_content: Some(text),
            excerpt: Some(excerpt),
            byline: byline(&doc),
            direction,
            language,
        })
    }
}
