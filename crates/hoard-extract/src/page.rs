//! HTTP page fetcher.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use tracing::debug;

use hoard_core::{Error, PageDocument, PageFetcher, Result};

use crate::config::PageFetcherConfig;

/// Fetches pages with browser-like headers.
#[derive(Clone)]
pub struct HttpPageFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpPageFetcher {
    pub fn new(config: &PageFetcherConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

/// Whether a Content-Type can hold a readable document.
fn is_markup(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime.contains("html") || mime.ends_with("xml")
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<PageDocument> {
        let start = Instant::now();
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("HTTP {} for {}", status, url)));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_markup(&content_type) {
            return Err(Error::Fetch(format!(
                "unsupported content type {} for {}",
                content_type, url
            )));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes as u64 {
                return Err(Error::Fetch(format!(
                    "body of {} is {} bytes, limit is {}",
                    url, len, self.max_body_bytes
                )));
            }
        }

        let final_url = response.url().to_string();
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::Fetch(format!("failed to read body of {}: {}", url, e)))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(Error::Fetch(format!(
                    "body of {} exceeds {} bytes",
                    url, self.max_body_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }
        let html = String::from_utf8_lossy(&body).into_owned();

        debug!(
            component = "page_fetcher",
            url,
            final_url = %final_url,
            bytes = html.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Page fetched"
        );

        Ok(PageDocument {
            url: url.to_string(),
            final_url,
            html,
        })
    }
}
