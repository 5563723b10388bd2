//! Client configuration.

use std::time::Duration;

use hoard_core::defaults;

/// Media extraction service settings.
///
/// Environment variables:
/// - `MEDIA_EXTRACTOR_URL` (userinfo, if any, is sent as basic auth)
/// - `MEDIA_EXTRACTOR_TIMEOUT_SECS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaExtractorConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for MediaExtractorConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::MEDIA_EXTRACTOR_URL.to_string(),
            timeout: Duration::from_secs(defaults::MEDIA_EXTRACTOR_TIMEOUT_SECS),
        }
    }
}

impl MediaExtractorConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("MEDIA_EXTRACTOR_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| defaults::MEDIA_EXTRACTOR_URL.to_string());

        let timeout_secs = std::env::var("MEDIA_EXTRACTOR_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::MEDIA_EXTRACTOR_TIMEOUT_SECS);

        Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Page fetcher settings.
///
/// Environment variables:
/// - `PAGE_FETCH_TIMEOUT_SECS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFetcherConfig {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
    /// Bodies larger than this fail the fetch.
    pub max_body_bytes: usize,
}

impl Default for PageFetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(defaults::PAGE_FETCH_TIMEOUT_SECS),
            max_redirects: defaults::PAGE_FETCH_MAX_REDIRECTS,
            user_agent: defaults::PAGE_FETCH_USER_AGENT.to_string(),
            max_body_bytes: defaults::PAGE_FETCH_MAX_BYTES,
        }
    }
}

impl PageFetcherConfig {
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("PAGE_FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::PAGE_FETCH_TIMEOUT_SECS);
        let max_body_bytes = std::env::var("PAGE_FETCH_MAX_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::PAGE_FETCH_MAX_BYTES);

        Self {
            timeout: Duration::from_secs(timeout_secs),
            max_body_bytes,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_config_defaults() {
        let config = MediaExtractorConfig::default();
        assert_eq!(config.base_url, "http://localhost:5000/");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_media_config_builder() {
        let config = MediaExtractorConfig::default()
            .with_base_url("http://u:p@extractor:8080/")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.base_url, "http://u:p@extractor:8080/");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_page_config_defaults() {
        let config = PageFetcherConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.max_body_bytes, 5 * 1024 * 1024);
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
    }
}
