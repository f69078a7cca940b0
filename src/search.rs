//! Site-scoped candidate search against the Google Custom Search JSON API.
//!
//! Each configured site is queried as `site:<domain> <query>` and paged ten
//! results at a time until the per-site quota is met or results run out.
//! One site failing never stops the others.

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::models::{Candidate, CandidatePool};
use crate::utils::truncate_for_log;

pub const PAGE_SIZE: u32 = 10;

/// Sites whose results sometimes come back on a mobile host, mapped to that host.
static MOBILE_HOSTS: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| HashMap::from([("khan.co.kr", "m.khan.co.kr")]));

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Network(String),

    #[error("search API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not parse search response: {0}")]
    Parse(String),
}

/// One raw search hit. Any field may be missing.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SearchItem {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Option<Vec<SearchItem>>,
}

/// A paged search API.
pub trait SearchBackend {
    /// Fetch one page of results starting at the 1-based offset `start`.
    /// An empty page means there are no further results.
    async fn search_page(&self, query: &str, start: u32) -> Result<Vec<SearchItem>, SearchError>;
}

/// Google Custom Search JSON API client.
#[derive(Clone)]
pub struct GoogleCustomSearch {
    http: Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
}

impl fmt::Debug for GoogleCustomSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleCustomSearch")
            .field("endpoint", &self.endpoint)
            .field("engine_id", &self.engine_id)
            .finish()
    }
}

impl GoogleCustomSearch {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Network(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
        })
    }

    fn page_url(&self, query: &str, start: u32) -> String {
        format!(
            "{}?key={}&cx={}&q={}&start={}&num={}",
            self.endpoint,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&self.engine_id),
            urlencoding::encode(query),
            start,
            PAGE_SIZE
        )
    }
}

impl SearchBackend for GoogleCustomSearch {
    async fn search_page(&self, query: &str, start: u32) -> Result<Vec<SearchItem>, SearchError> {
        let response = self
            .http
            .get(self.page_url(query, start))
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;
        Ok(parsed.items.unwrap_or_default())
    }
}

/// Rewrite a known mobile host back to the site's canonical host.
pub fn canonical_link(site: &str, link: &str) -> String {
    let Some(mobile) = MOBILE_HOSTS.get(site) else {
        return link.to_string();
    };
    match Url::parse(link) {
        Ok(mut url) if url.host_str() == Some(*mobile) => match url.set_host(Some(site)) {
            Ok(()) => url.to_string(),
            Err(_) => link.to_string(),
        },
        _ => link.to_string(),
    }
}

/// Collects candidates per site through a [`SearchBackend`].
#[derive(Debug)]
pub struct CandidateSearch<B> {
    backend: B,
}

impl<B: SearchBackend> CandidateSearch<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Build a pool of up to `per_site_quota` candidates per site, in site
    /// order then search-rank order.
    #[instrument(level = "info", skip_all, fields(%query, per_site_quota, sites = sites.len()))]
    pub async fn collect(&self, query: &str, per_site_quota: usize, sites: &[String]) -> CandidatePool {
        let per_site: Vec<Vec<Candidate>> = stream::iter(sites)
            .then(|site| self.collect_site(query, per_site_quota, site))
            .collect()
            .await;

        let candidates: Vec<Candidate> = per_site.into_iter().flatten().collect();
        info!(count = candidates.len(), "Collected candidate pool");
        CandidatePool::new(candidates)
    }

    #[instrument(level = "info", skip(self, query, per_site_quota))]
    async fn collect_site(&self, query: &str, per_site_quota: usize, site: &str) -> Vec<Candidate> {
        let site_query = format!("site:{site} {query}");
        let mut collected = Vec::new();
        let mut start = 1u32;

        while collected.len() < per_site_quota {
            let items = match self.backend.search_page(&site_query, start).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(error = %e, "Search failed; moving to next site");
                    break;
                }
            };
            if items.is_empty() {
                debug!(start, "No more results for site");
                break;
            }

            for item in items.into_iter().take(per_site_quota - collected.len()) {
                let link = item.link.unwrap_or_default();
                collected.push(Candidate {
                    title: item.title.unwrap_or_default(),
                    description: item.snippet.unwrap_or_default(),
                    link: canonical_link(site, &link),
                    domain: site.to_string(),
                });
            }
            start += PAGE_SIZE;
        }

        debug!(count = collected.len(), "Collected site results");
        collected
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{item, CannedSearch};
    use super::*;

    fn sites(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn page_of(prefix: &str, n: usize) -> Vec<SearchItem> {
        (0..n)
            .map(|i| item(&format!("https://{prefix}/{i}"), &format!("{prefix} {i}")))
            .collect()
    }

    #[tokio::test]
    async fn test_paginates_until_quota() {
        let backend = CannedSearch::new()
            .page("site:bbc.com space", 1, page_of("bbc.com/a", 10))
            .page("site:bbc.com space", 11, page_of("bbc.com/b", 10));
        let search = CandidateSearch::new(backend);

        let pool = search.collect("space", 12, &sites(&["bbc.com"])).await;
        assert_eq!(pool.len(), 12);
        assert_eq!(pool.get(10).unwrap().link, "https://bbc.com/b/0");
        assert_eq!(
            search.backend.requests(),
            vec![
                ("site:bbc.com space".to_string(), 1),
                ("site:bbc.com space".to_string(), 11)
            ]
        );
    }

    #[tokio::test]
    async fn test_stops_when_results_run_out() {
        let backend = CannedSearch::new().page("site:ytn.co.kr art", 1, page_of("ytn.co.kr", 2));
        let search = CandidateSearch::new(backend);

        let pool = search.collect("art", 5, &sites(&["ytn.co.kr"])).await;
        assert_eq!(pool.len(), 2);
        assert_eq!(search.backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_site_failure_does_not_stop_other_sites() {
        let backend = CannedSearch::new()
            .status("site:bbc.com art", 1, 403)
            .page("site:hani.co.kr art", 1, page_of("hani.co.kr", 3));
        let search = CandidateSearch::new(backend);

        let pool = search
            .collect("art", 2, &sites(&["bbc.com", "hani.co.kr"]))
            .await;
        let domains: Vec<&str> = pool.iter().map(|(_, c)| c.domain.as_str()).collect();
        assert_eq!(domains, vec!["hani.co.kr", "hani.co.kr"]);
    }

    #[tokio::test]
    async fn test_pool_follows_site_order_and_records_configured_domain() {
        let backend = CannedSearch::new()
            .page("site:news.sbs.co.kr ai", 1, vec![item("https://www.sbs.co.kr/1", "sbs")])
            .page("site:bbc.com ai", 1, vec![item("https://www.bbc.com/1", "bbc")]);
        let search = CandidateSearch::new(backend);

        let pool = search
            .collect("ai", 3, &sites(&["news.sbs.co.kr", "bbc.com"]))
            .await;
        let rows: Vec<(usize, &str, &str)> = pool
            .iter()
            .map(|(id, c)| (id, c.title.as_str(), c.domain.as_str()))
            .collect();
        assert_eq!(rows, vec![(0, "sbs", "news.sbs.co.kr"), (1, "bbc", "bbc.com")]);
    }

    #[tokio::test]
    async fn test_no_results_is_an_empty_pool() {
        let search = CandidateSearch::new(CannedSearch::new());
        let pool = search.collect("nothing", 3, &sites(&["bbc.com"])).await;
        assert!(pool.is_empty());
    }

    #[test]
    fn test_canonical_link_rewrites_mobile_host() {
        assert_eq!(
            canonical_link("khan.co.kr", "https://m.khan.co.kr/article/2024"),
            "https://khan.co.kr/article/2024"
        );
        assert_eq!(
            canonical_link("khan.co.kr", "https://www.khan.co.kr/article/2024"),
            "https://www.khan.co.kr/article/2024"
        );
        assert_eq!(
            canonical_link("bbc.com", "https://m.khan.co.kr/x"),
            "https://m.khan.co.kr/x"
        );
    }

    #[test]
    fn test_page_url_encodes_query() {
        let google = GoogleCustomSearch::new(
            "https://www.googleapis.com/customsearch/v1",
            "key",
            "cx",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            google.page_url("site:bbc.com deep sea", 11),
            "https://www.googleapis.com/customsearch/v1?key=key&cx=cx&q=site%3Abbc.com%20deep%20sea&start=11&num=10"
        );
    }
}
