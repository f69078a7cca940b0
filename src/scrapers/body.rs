//! Article body extraction.
//!
//! Once a rule matches a container element:
//! - two or fewer `<p>` descendants: the container's whole text
//! - otherwise: text of `h1`–`h4`, `p` and `li` descendants in document
//!   order, one per line
//! - no such descendants at all: the container's whole text

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};

use super::{ExtractError, ExtractionRule, PageFetcher, RuleTable};

static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("static selector"));
static TEXT_BLOCKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, p, li").expect("static selector"));

const MIN_STRUCTURED_PARAGRAPHS: usize = 3;

/// Fetches article pages and pulls out their body text.
#[derive(Debug)]
pub struct BodyExtractor<F> {
    fetcher: F,
    rules: RuleTable,
}

impl<F: PageFetcher> BodyExtractor<F> {
    pub fn new(fetcher: F, rules: RuleTable) -> Self {
        Self { fetcher, rules }
    }

    #[cfg(test)]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch `url` and extract its body using the rules for `domain`.
    #[instrument(level = "info", skip(self))]
    pub async fn extract(&self, url: &str, domain: &str) -> Result<String, ExtractError> {
        let rules = self.rules.get(domain).ok_or_else(|| ExtractError::NoMapping {
            domain: domain.to_string(),
        })?;
        let html = self.fetcher.fetch(url).await?;
        let body = extract_from_html(&html, domain, rules)?;
        info!(bytes = body.len(), "Extracted article body");
        Ok(body)
    }
}

/// Apply `rules` in order to an HTML document; the first rule matching an
/// element with any text wins.
pub fn extract_from_html(
    html: &str,
    domain: &str,
    rules: &[ExtractionRule],
) -> Result<String, ExtractError> {
    let document = Html::parse_document(html);

    for rule in rules {
        let selector = rule.selector()?;
        let container = document
            .select(&selector)
            .find(|el| !flattened_text(*el).is_empty());
        if let Some(container) = container {
            debug!(rule = %rule.css(), "Extraction rule matched");
            return Ok(container_text(container));
        }
    }

    Err(ExtractError::NoMatch {
        domain: domain.to_string(),
    })
}

fn container_text(container: ElementRef<'_>) -> String {
    if container.select(&PARAGRAPHS).count() < MIN_STRUCTURED_PARAGRAPHS {
        return flattened_text(container);
    }

    let blocks: Vec<String> = container
        .select(&TEXT_BLOCKS)
        .map(flattened_text)
        .collect();
    if blocks.is_empty() {
        flattened_text(container)
    } else {
        blocks.join("\n")
    }
}

/// All descendant text, each run trimmed, blank runs dropped, joined by spaces.
fn flattened_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
