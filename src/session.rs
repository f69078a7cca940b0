//! One user session: feedback in, one recommendation out, repeated.

use chrono::Local;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::api::{AskAsync, AskError};
use crate::cli::OutputFormat;
use crate::keywords::KeywordGenerator;
use crate::models::{ExtractedArticle, FeedbackLog, SearchQuery};
use crate::recommend::RecommendationLoop;
use crate::scrapers::{BodyExtractor, PageFetcher};
use crate::search::{CandidateSearch, SearchBackend};
use crate::selector::ArticleSelector;

/// Per-round limits.
#[derive(Debug, Clone)]
pub struct RoundSettings {
    pub sites: Vec<String>,
    pub per_site_quota: usize,
    pub max_keywords: usize,
}

/// What a single round produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub keywords: Vec<String>,
    pub search_query: String,
    pub article: Option<ExtractedArticle>,
}

/// The pipeline plus the state carried between rounds.
pub struct Session<C, S, F> {
    keywords: KeywordGenerator<C>,
    search: CandidateSearch<S>,
    selector: ArticleSelector<C>,
    extractor: BodyExtractor<F>,
    settings: RoundSettings,
    feedback: FeedbackLog,
    query: SearchQuery,
}

impl<C: AskAsync, S: SearchBackend, F: PageFetcher> Session<C, S, F> {
    pub fn new(
        keywords: KeywordGenerator<C>,
        search: CandidateSearch<S>,
        selector: ArticleSelector<C>,
        extractor: BodyExtractor<F>,
        settings: RoundSettings,
        initial_query: &str,
    ) -> Self {
        Self {
            keywords,
            search,
            selector,
            extractor,
            settings,
            feedback: FeedbackLog::new(),
            query: SearchQuery::parse(initial_query),
        }
    }

    pub fn feedback(&self) -> &FeedbackLog {
        &self.feedback
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Record `feedback_text` and try to recommend one article.
    #[instrument(level = "info", skip_all, fields(round = self.feedback.len()))]
    pub async fn round(&mut self, feedback_text: &str) -> Result<RoundOutcome, AskError> {
        let entry = self.feedback.append(feedback_text);
        info!(index = entry.index, empty = entry.feedback.is_empty(), "Recorded feedback");

        let keywords = self
            .keywords
            .generate(&self.query, &self.feedback, self.settings.max_keywords)
            .await;
        let search_query = if keywords.is_empty() {
            warn!("No keywords generated; searching with the current query");
            self.query.text.clone()
        } else {
            keywords.join(" ")
        };

        let mut pool = self
            .search
            .collect(&search_query, self.settings.per_site_quota, &self.settings.sites)
            .await;
        let article = RecommendationLoop::new(&self.selector, &self.extractor)
            .run(&mut pool, &self.feedback)
            .await?;

        self.query = match article {
            Some(_) => SearchQuery::new(search_query.clone()),
            None => SearchQuery::after_empty_round(search_query.clone()),
        };

        Ok(RoundOutcome {
            keywords,
            search_query,
            article,
        })
    }
}

/// JSON form of a recommendation.
#[derive(Debug, Serialize)]
struct Recommendation<'a> {
    recommended_at: String,
    keywords: &'a [String],
    #[serde(flatten)]
    article: &'a ExtractedArticle,
}

/// Render a round's result for stdout.
pub fn render(outcome: &RoundOutcome, format: OutputFormat) -> String {
    match (&outcome.article, format) {
        (None, OutputFormat::Text) => format!(
            "No suitable article found for \"{}\".",
            outcome.search_query
        ),
        (None, OutputFormat::Json) => serde_json::json!({
            "recommended_at": Local::now().to_rfc3339(),
            "keywords": outcome.keywords,
            "article": null,
        })
        .to_string(),
        (Some(article), OutputFormat::Text) => format!(
            "# {}\n<{}>\n\n{}\n",
            article.title, article.url, article.body
        ),
        (Some(article), OutputFormat::Json) => {
            let record = Recommendation {
                recommended_at: Local::now().to_rfc3339(),
                keywords: &outcome.keywords,
                article,
            };
            serde_json::to_string(&record).unwrap_or_default()
        }
    }
}
