//! The select → extract → validate loop.
//!
//! ```text
//! Selecting ──(no selection)──────────────▶ Empty
//!     │ selection
//!     ▼
//! Extracting ──(bad row / thin body)──▶ remove candidate ──▶ Selecting
//!     │ body passes
//!     ▼
//!   Valid
//! ```
//!
//! Every failed pass removes at least one candidate, so a pool of `n`
//! candidates needs at most `n + 1` selections before the loop ends.

use tracing::{info, instrument, warn};

use crate::api::{AskAsync, AskError};
use crate::models::{CandidatePool, ExtractedArticle, FeedbackLog, Selection};
use crate::scrapers::{BodyExtractor, PageFetcher};
use crate::selector::ArticleSelector;
use crate::utils::{is_substantial_body, sentence_count};

enum LoopState {
    Selecting,
    Extracting(Selection),
    Valid(ExtractedArticle),
    Empty,
}

/// Drives [`ArticleSelector`] and [`BodyExtractor`] against a shrinking pool.
#[derive(Debug)]
pub struct RecommendationLoop<'a, C, F> {
    selector: &'a ArticleSelector<C>,
    extractor: &'a BodyExtractor<F>,
}

impl<'a, C: AskAsync, F: PageFetcher> RecommendationLoop<'a, C, F> {
    pub fn new(selector: &'a ArticleSelector<C>, extractor: &'a BodyExtractor<F>) -> Self {
        Self {
            selector,
            extractor,
        }
    }

    /// Find one article whose body passes validation.
    ///
    /// Candidates that cannot be fetched or whose body is too thin are
    /// removed from `pool`. Returns `Ok(None)` once no selection can be made.
    #[instrument(level = "info", skip_all, fields(pool = pool.len()))]
    pub async fn run(
        &self,
        pool: &mut CandidatePool,
        feedback: &FeedbackLog,
    ) -> Result<Option<ExtractedArticle>, AskError> {
        let mut state = LoopState::Selecting;
        let mut attempts = 0usize;

        loop {
            state = match state {
                LoopState::Selecting => {
                    attempts += 1;
                    match self.selector.select(pool, feedback).await? {
                        Some(selection) => LoopState::Extracting(selection),
                        None => LoopState::Empty,
                    }
                }
                LoopState::Extracting(selection) => self.extract(selection, pool).await,
                LoopState::Valid(article) => {
                    info!(attempts, title = %article.title, url = %article.url, "Recommendation ready");
                    return Ok(Some(article));
                }
                LoopState::Empty => {
                    info!(attempts, "No recommendable article left");
                    return Ok(None);
                }
            };
        }
    }

    async fn extract(&self, selection: Selection, pool: &mut CandidatePool) -> LoopState {
        let Some(target) = selection.candidate.article_target() else {
            warn!(
                index = selection.index,
                link = %selection.candidate.link,
                "Selected row has no usable link or domain; removing it"
            );
            pool.remove(selection.index);
            return LoopState::Selecting;
        };

        let valid = match self.extractor.extract(&target.url, &target.domain).await {
            Ok(body) if is_substantial_body(&body) => Some(body),
            Ok(body) => {
                warn!(
                    title = %target.title,
                    url = %target.url,
                    sentences = sentence_count(&body),
                    "Body missing or too short; removing article"
                );
                None
            }
            Err(e) => {
                warn!(title = %target.title, url = %target.url, diagnostic = %e, "Body extraction failed; removing article");
                None
            }
        };

        match valid {
            Some(body) => LoopState::Valid(ExtractedArticle {
                title: target.title,
                url: target.url,
                body,
            }),
            None => {
                // A link-matched removal always includes the selected row itself.
                if pool.remove_by_link(&selection.candidate.link) == 0 {
                    pool.remove(selection.index);
                }
                LoopState::Selecting
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedChat;
    use crate::models::Candidate;
    use crate::scrapers::testing::StaticPages;
    use crate::scrapers::{ExtractionRule, RuleTable};
    use std::collections::HashMap;
    use std::time::Duration;

    const DOMAIN: &str = "synthetic.test";

    fn rules() -> RuleTable {
        RuleTable::new(HashMap::from([(
            DOMAIN.to_string(),
            vec![ExtractionRule::new("div", "story")],
        )]))
    }

    fn candidate(n: usize, domain: &str) -> Candidate {
        Candidate {
            title: format!("Story {n}"),
            description: format!("About story {n}"),
            link: format!("https://{DOMAIN}/story/{n}"),
            domain: domain.to_string(),
        }
    }

    fn page(sentences: usize) -> String {
        let body: String = (1..=sentences).map(|i| format!("Sentence {i}. ")).collect();
        format!(r#"<html><body><div class="story">{body}</div></body></html>"#)
    }

    fn pick(index: usize) -> String {
        format!(r#"{{"index": {index}, "reason": "fits the feedback"}}"#)
    }

    #[tokio::test]
    async fn test_single_valid_candidate_is_returned() {
        let chat = ScriptedChat::new().reply(&pick(0));
        let pages = StaticPages::new().page("https://synthetic.test/story/0", &page(6));
        let selector = ArticleSelector::new(&chat, Duration::ZERO);
        let extractor = BodyExtractor::new(pages, rules());
        let mut pool = CandidatePool::new(vec![candidate(0, DOMAIN)]);

        let article = RecommendationLoop::new(&selector, &extractor)
            .run(&mut pool, &FeedbackLog::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(article.title, "Story 0");
        assert_eq!(article.url, "https://synthetic.test/story/0");
        assert!(article.body.starts_with("Sentence 1."));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_thin_body_is_removed_and_selection_repeated() {
        let chat = ScriptedChat::new().reply(&pick(0)).reply(&pick(1));
        let pages = StaticPages::new()
            .page("https://synthetic.test/story/0", &page(3))
            .page("https://synthetic.test/story/1", &page(8));
        let selector = ArticleSelector::new(&chat, Duration::ZERO);
        let extractor = BodyExtractor::new(pages, rules());
        let mut pool = CandidatePool::new(vec![candidate(0, DOMAIN), candidate(1, DOMAIN)]);

        let article = RecommendationLoop::new(&selector, &extractor)
            .run(&mut pool, &FeedbackLog::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(article.title, "Story 1");
        assert!(!pool.contains(0));
        assert!(pool.contains(1));
        // The second prompt only lists the surviving candidate.
        let second = &chat.prompts()[1].user;
        assert!(second.contains("[Index: 1]"));
        assert!(!second.contains("[Index: 0]"));
    }

    #[tokio::test]
    async fn test_empty_pool_returns_nothing() {
        let chat = ScriptedChat::new();
        let selector = ArticleSelector::new(&chat, Duration::ZERO);
        let extractor = BodyExtractor::new(StaticPages::new(), rules());
        let mut pool = CandidatePool::default();

        let result = RecommendationLoop::new(&selector, &extractor)
            .run(&mut pool, &FeedbackLog::new())
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn test_unmapped_domain_is_removed() {
        let chat = ScriptedChat::new().reply(&pick(0)).reply(&pick(1));
        let pages = StaticPages::new().page("https://synthetic.test/story/1", &page(7));
        let selector = ArticleSelector::new(&chat, Duration::ZERO);
        let extractor = BodyExtractor::new(pages, rules());
        let mut pool = CandidatePool::new(vec![
            candidate(0, "unknown.example"),
            candidate(1, DOMAIN),
        ]);

        let article = RecommendationLoop::new(&selector, &extractor)
            .run(&mut pool, &FeedbackLog::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(article.title, "Story 1");
        assert!(!pool.contains(0));
        assert_eq!(extractor_fetches(&extractor), vec!["https://synthetic.test/story/1"]);
    }

    #[tokio::test]
    async fn test_malformed_row_is_removed_by_index() {
        let mut broken = candidate(0, DOMAIN);
        broken.link = String::new();
        let chat = ScriptedChat::new().reply(&pick(0)).reply(&pick(1));
        let pages = StaticPages::new().page("https://synthetic.test/story/1", &page(6));
        let selector = ArticleSelector::new(&chat, Duration::ZERO);
        let extractor = BodyExtractor::new(pages, rules());
        let mut pool = CandidatePool::new(vec![broken, candidate(1, DOMAIN)]);

        let article = RecommendationLoop::new(&selector, &extractor)
            .run(&mut pool, &FeedbackLog::new())
            .await
            .unwrap();
        assert_eq!(article.map(|a| a.title), Some("Story 1".to_string()));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_pool_pick_ends_the_loop() {
        let chat = ScriptedChat::new().reply(&pick(5)).reply(&pick(0));
        let pages = StaticPages::new().page("https://synthetic.test/story/0", &page(6));
        let selector = ArticleSelector::new(&chat, Duration::ZERO);
        let extractor = BodyExtractor::new(pages, rules());
        let mut pool = CandidatePool::new(vec![candidate(0, DOMAIN)]);

        let result = RecommendationLoop::new(&selector, &extractor)
            .run(&mut pool, &FeedbackLog::new())
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(chat.calls(), 1);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausting_the_pool_takes_at_most_n_plus_one_selections() {
        let n = 4;
        let mut chat = ScriptedChat::new();
        for i in 0..n {
            chat = chat.reply(&pick(i));
        }
        let mut pages = StaticPages::new();
        for i in 0..n {
            pages = pages.page(&format!("https://synthetic.test/story/{i}"), &page(2));
        }
        let selector = ArticleSelector::new(&chat, Duration::ZERO);
        let extractor = BodyExtractor::new(pages, rules());
        let mut pool = CandidatePool::new((0..n).map(|i| candidate(i, DOMAIN)).collect());

        let result = RecommendationLoop::new(&selector, &extractor)
            .run(&mut pool, &FeedbackLog::new())
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(pool.is_empty());
        // The final selection sees an empty pool and never reaches the backend.
        assert_eq!(chat.calls(), n);
        assert!(chat.calls() <= n + 1);
    }

    fn extractor_fetches(extractor: &BodyExtractor<StaticPages>) -> Vec<String> {
        extractor.fetcher().fetched()
    }
}
