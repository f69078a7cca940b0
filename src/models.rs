//! Data models shared across the recommendation pipeline.
//!
//! - [`Feedback`] / [`FeedbackEntry`] / [`FeedbackLog`]: the user's running commentary
//! - [`SearchQuery`]: the query carried between rounds
//! - [`Candidate`] / [`CandidatePool`]: search results awaiting selection
//! - [`Selection`]: the model's pick, resolved against the pool
//! - [`ExtractedArticle`]: the validated article handed back to the caller

use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;
use url::Url;

/// Marker shown to the model in place of an empty feedback entry.
pub const NO_FEEDBACK_MARKER: &str = "NOFEEDBACK";

/// Trailing token that older callers appended to a query when the previous
/// round produced no usable article.
pub const NO_ARTICLE_MARKER: &str = "NOARTICLE";

/// One user turn worth of feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Text(String),
    NoFeedback,
}

impl Feedback {
    pub fn is_empty(&self) -> bool {
        matches!(self, Feedback::NoFeedback)
    }
}

impl Serialize for Feedback {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Feedback::Text(text) => serializer.serialize_str(text),
            Feedback::NoFeedback => serializer.serialize_str(NO_FEEDBACK_MARKER),
        }
    }
}

/// A feedback entry with its insertion-order index.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FeedbackEntry {
    pub index: usize,
    pub feedback: Feedback,
}

/// Append-only feedback history, newest last.
#[derive(Debug, Default, Clone, serde::Serialize)]
#[serde(transparent)]
pub struct FeedbackLog {
    entries: Vec<FeedbackEntry>,
}

impl FeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user turn. Blank input is stored as [`Feedback::NoFeedback`].
    pub fn append(&mut self, text: &str) -> FeedbackEntry {
        let trimmed = text.trim();
        let feedback = if trimmed.is_empty() {
            Feedback::NoFeedback
        } else {
            Feedback::Text(trimmed.to_string())
        };
        let entry = FeedbackEntry {
            index: self.entries.len(),
            feedback,
        };
        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[FeedbackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry with the highest index.
    pub fn latest(&self) -> Option<&FeedbackEntry> {
        self.entries.last()
    }

    /// `true` when the log is empty or every entry is the no-feedback marker.
    pub fn has_no_real_feedback(&self) -> bool {
        self.entries.iter().all(|e| e.feedback.is_empty())
    }

    /// JSON rendering used inside model prompts.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[]".to_string())
    }
}

/// The query for a keyword-generation round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    /// The previous round ended without a usable article.
    pub previous_round_empty: bool,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            previous_round_empty: false,
        }
    }

    pub fn after_empty_round(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            previous_round_empty: true,
        }
    }

    /// Read raw query text, recognising a trailing `NOARTICLE` marker.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_end();
        match trimmed.strip_suffix(NO_ARTICLE_MARKER) {
            Some(rest) => Self::after_empty_round(rest.trim_end()),
            None => Self::new(trimmed),
        }
    }
}

/// A search hit that may be recommended.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Candidate {
    pub title: String,
    pub description: String,
    pub link: String,
    /// The configured site this result was searched under.
    pub domain: String,
}

/// Fields needed to fetch and label a selected candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleTarget {
    pub url: String,
    pub domain: String,
    pub title: String,
}

impl Candidate {
    /// Resolve the fetchable target, or `None` when the row is unusable
    /// (link missing or not an absolute http(s) URL, or no domain).
    pub fn article_target(&self) -> Option<ArticleTarget> {
        let url = Url::parse(self.link.trim()).ok()?;
        if !matches!(url.scheme(), "http" | "https") || self.domain.trim().is_empty() {
            return None;
        }
        Some(ArticleTarget {
            url: self.link.trim().to_string(),
            domain: self.domain.clone(),
            title: self.title.clone(),
        })
    }
}

/// Candidates keyed by the id they were given when the pool was built.
///
/// Rows can only be removed. Ids are never reassigned, so a model answer
/// that references the original enumeration stays meaningful.
#[derive(Debug, Default, Clone)]
pub struct CandidatePool {
    rows: BTreeMap<usize, Candidate>,
}

impl CandidatePool {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            rows: candidates.into_iter().enumerate().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Candidate> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: usize) -> bool {
        self.rows.contains_key(&id)
    }

    /// Iterate `(id, candidate)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Candidate)> {
        self.rows.iter().map(|(id, c)| (*id, c))
    }

    pub fn remove(&mut self, id: usize) -> Option<Candidate> {
        self.rows.remove(&id)
    }

    /// Drop every row pointing at `link`. Returns how many were removed.
    pub fn remove_by_link(&mut self, link: &str) -> usize {
        let before = self.rows.len();
        self.rows.retain(|_, c| c.link != link);
        before - self.rows.len()
    }
}

/// The model's pick, already checked against the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub reason: String,
    pub candidate: Candidate,
}

/// A recommended article whose body passed validation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ExtractedArticle {
    pub title: String,
    pub url: String,
    pub body: String,
}
