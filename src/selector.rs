//! Model-driven pick of a single candidate from the pool.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::api::{AskAsync, AskError, ChatPrompt, RateLimitRetry};
use crate::models::{CandidatePool, FeedbackLog, Selection};
use crate::utils::{strip_code_fence, truncate_for_log};

const SELECTION_MAX_TOKENS: u32 = 2048;

const SELECTOR_INSTRUCTIONS: &str = "\
# Instructions
You recommend one article to a user, judging from the user's feedback and each article's title and description.

# Criteria
1. Give the most recent feedback (highest index) priority.
2. Choose the article most closely related to the subject of the most recent feedback.
3. Judge suitability from the title and the description.
4. Exclude plain news bulletins, advertorial content and duplicates.
5. The article must explain something or help the reader learn.

# Output
Always answer with JSON of this form:
{
  \"index\": \"index of the recommended article\",
  \"reason\": \"a short explanation of why it fits\"
}";

/// Why a model reply could not be turned into a [`Selection`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("reply is not JSON")]
    NotJson,
    #[error("reply is missing `index` or `reason`")]
    MissingKeys,
    #[error("index {0} is not an integer")]
    NotAnInteger(String),
    #[error("index {0} is not in the candidate pool")]
    NotInPool(i64),
}

/// Asks the generation backend to choose one candidate.
#[derive(Debug)]
pub struct ArticleSelector<C> {
    chat: RateLimitRetry<C>,
}

impl<C: AskAsync> ArticleSelector<C> {
    pub fn new(chat: C, rate_limit_delay: Duration) -> Self {
        Self {
            chat: RateLimitRetry::new(chat, rate_limit_delay),
        }
    }

    /// Pick one candidate.
    ///
    /// `Ok(None)` means no usable selection: the pool is empty or the reply
    /// failed validation. Throttling is retried inside; any other backend
    /// failure is returned as an error.
    #[instrument(level = "info", skip_all, fields(pool = pool.len()))]
    pub async fn select(
        &self,
        pool: &CandidatePool,
        feedback: &FeedbackLog,
    ) -> Result<Option<Selection>, AskError> {
        if pool.is_empty() {
            info!("Candidate pool is empty; nothing to select");
            return Ok(None);
        }

        let reply = self.chat.ask(&build_prompt(pool, feedback)).await?;
        match parse_selection(&reply, pool) {
            Ok(selection) => {
                info!(
                    index = selection.index,
                    title = %selection.candidate.title,
                    reason = %selection.reason,
                    "Recommended article"
                );
                Ok(Some(selection))
            }
            Err(e) => {
                warn!(error = %e, reply = %truncate_for_log(&reply, 300), "Unusable selection");
                Ok(None)
            }
        }
    }
}

pub fn build_prompt(pool: &CandidatePool, feedback: &FeedbackLog) -> ChatPrompt {
    let listing = pool
        .iter()
        .enumerate()
        .map(|(position, (index, candidate))| {
            format!(
                "{position}. [Index: {index}] Title: {}\n   Description: {}\n",
                candidate.title, candidate.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    ChatPrompt {
        system: SELECTOR_INSTRUCTIONS.to_string(),
        user: format!(
            "User feedback: {}\n\nArticles (with index):\n{listing}",
            feedback.to_prompt_json()
        ),
        max_tokens: SELECTION_MAX_TOKENS,
    }
}

/// Validate a reply and resolve it against `pool`.
pub fn parse_selection(reply: &str, pool: &CandidatePool) -> Result<Selection, SelectionError> {
    let json: Value =
        serde_json::from_str(strip_code_fence(reply)).map_err(|_| SelectionError::NotJson)?;
    let (Some(raw_index), Some(reason)) = (json.get("index"), json.get("reason")) else {
        return Err(SelectionError::MissingKeys);
    };

    let index = integer_index(raw_index)
        .ok_or_else(|| SelectionError::NotAnInteger(raw_index.to_string()))?;
    let (id, candidate) = usize::try_from(index)
        .ok()
        .and_then(|id| pool.get(id).map(|c| (id, c)))
        .ok_or(SelectionError::NotInPool(index))?;

    let reason = match reason {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    Ok(Selection {
        index: id,
        reason,
        candidate: candidate.clone(),
    })
}

/// Accept `2`, `2.0` and `"2"` alike.
fn integer_index(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
