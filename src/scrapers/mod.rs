//! Article page fetching and body extraction.
//!
//! Bodies are pulled from a small, fixed set of news outlets. Each outlet is
//! described by one or more `{tag, class}` rules in a [`RuleTable`]; pages
//! from domains missing from the table are not scraped.
//!
//! | Module | Role |
//! |--------|------|
//! | [`rules`] | Domain → ordered extraction rules |
//! | [`body`] | [`BodyExtractor`]: fetch a page and apply the rules |
//!
//! Fetching goes through the [`PageFetcher`] trait so the extractor can be
//! driven from memory in tests.

pub mod body;
pub mod rules;

pub use body::BodyExtractor;
pub use rules::{ExtractionRule, RuleTable};

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Desktop browser identity sent with page requests.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36";

/// Reasons a body could not be extracted. The `Display` text doubles as the
/// diagnostic shown to users.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no extraction rules for domain {domain}")]
    NoMapping { domain: String },

    #[error("no mapped tag/class matched for '{domain}'")]
    NoMatch { domain: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("body extraction failed: {0}")]
    Selector(String),
}

/// Something that can return the HTML behind a URL.
pub trait PageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ExtractError>;
}

/// reqwest-backed fetcher with a browser user agent and request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, ExtractError> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractError::Http(e.to_string()))?;
        Ok(Self { http })
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String, ExtractError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ExtractError::Http(e.to_string()))?;
        let html = response
            .text()
            .await
            .map_err(|e| ExtractError::Http(e.to_string()))?;
        debug!(bytes = html.len(), "Fetched page");
        Ok(html)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_name_the_domain() {
        let missing = ExtractError::NoMapping {
            domain: "example.org".into(),
        };
        assert!(missing.to_string().contains("example.org"));
        let unmatched = ExtractError::NoMatch {
            domain: "bbc.com".into(),
        };
        assert!(unmatched.to_string().contains("'bbc.com'"));
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpFetcher::new(BROWSER_USER_AGENT, Duration::from_secs(10)).is_ok());
    }
}
