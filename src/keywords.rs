//! Search keyword generation from the running query and feedback history.

use itertools::Itertools;
use rand::rng;
use rand::seq::IndexedRandom;
use std::fmt;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::api::{AskAsync, ChatPrompt, RateLimitRetry};
use crate::models::{FeedbackLog, SearchQuery};
use crate::utils::{json_array_slice, truncate_for_log};

const MIN_KEYWORDS: usize = 2;
const KEYWORD_MAX_TOKENS: u32 = 50;

/// Fallback topics used when the user has not said anything yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    History,
    Philosophy,
    Science,
    Art,
    Technology,
    Culture,
    Health,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Topic::History,
        Topic::Philosophy,
        Topic::Science,
        Topic::Art,
        Topic::Technology,
        Topic::Culture,
        Topic::Health,
    ];

    pub fn random() -> Topic {
        *Self::ALL.choose(&mut rng()).unwrap_or(&Topic::Science)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Topic::History => "history",
            Topic::Philosophy => "philosophy",
            Topic::Science => "science",
            Topic::Art => "art",
            Topic::Technology => "technology",
            Topic::Culture => "culture",
            Topic::Health => "health",
        };
        f.write_str(name)
    }
}

/// Turns a query plus feedback into a handful of search keywords.
#[derive(Debug)]
pub struct KeywordGenerator<C> {
    chat: RateLimitRetry<C>,
}

impl<C: AskAsync> KeywordGenerator<C> {
    pub fn new(chat: C, rate_limit_delay: Duration) -> Self {
        Self {
            chat: RateLimitRetry::new(chat, rate_limit_delay),
        }
    }

    /// Generate between 2 and `max_keywords` unique keywords.
    ///
    /// Returns an empty list when the backend fails for any reason other than
    /// throttling, or when the reply cannot be read as a keyword array.
    #[instrument(level = "info", skip_all, fields(query = %query.text, previous_round_empty = query.previous_round_empty))]
    pub async fn generate(
        &self,
        query: &SearchQuery,
        feedback: &FeedbackLog,
        max_keywords: usize,
    ) -> Vec<String> {
        let max_keywords = max_keywords.max(MIN_KEYWORDS);
        let topic = feedback.has_no_real_feedback().then(Topic::random);
        if let Some(topic) = topic {
            info!(%topic, "No feedback yet; picked a random topic");
        }

        let prompt = build_prompt(query, feedback, max_keywords, topic);
        let reply = match self.chat.ask(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Keyword generation call failed");
                return Vec::new();
            }
        };

        let keywords = parse_keywords(&reply, max_keywords);
        if keywords.is_empty() {
            warn!(reply = %truncate_for_log(&reply, 300), "Could not read keywords from reply");
        } else {
            info!(?keywords, "Generated keywords");
        }
        keywords
    }
}

/// Build the keyword prompt. `topic` is set only when there is no real feedback.
pub fn build_prompt(
    query: &SearchQuery,
    feedback: &FeedbackLog,
    max_keywords: usize,
    topic: Option<Topic>,
) -> ChatPrompt {
    let mut system = String::from(
        "You generate search-engine-optimised keywords for finding a news article.\n\n\
         # Conditions\n\
         - Weigh the most recent feedback (highest index) above everything else.\n\
         - If the most recent feedback is NOFEEDBACK, refine the query into more specific keywords \
         that do not repeat the query.\n",
    );
    if feedback.latest().is_some_and(|e| e.feedback.is_empty()) && topic.is_none() {
        system.push_str("- The most recent feedback is NOFEEDBACK.\n");
    }
    if let Some(topic) = topic {
        system.push_str(&format!(
            "- The user has given no feedback at all. Generate keywords about the topic: {topic}.\n"
        ));
    }
    if query.previous_round_empty {
        system.push_str(
            "- The previous search found no usable article. Generalise the query into broader, \
             more inclusive keywords.\n",
        );
    }
    system.push_str(&format!(
        "\n# Rules\n\
         - Prefer words that are frequently searched.\n\
         - Use concrete, noun-centred keywords of at most two words.\n\
         - Do not repeat words or keywords.\n\n\
         # Output\n\
         Return between {MIN_KEYWORDS} and {max_keywords} keywords as a JSON array of strings, \
         for example [\"keyword1\", \"keyword2\"]. Return nothing else."
    ));

    let user = format!(
        "User feedback (newest has the highest index): {}\nQuery: {}\n\nGenerate the keywords.",
        feedback.to_prompt_json(),
        query.text
    );

    ChatPrompt {
        system,
        user,
        max_tokens: KEYWORD_MAX_TOKENS,
    }
}

/// Read a keyword array out of a model reply.
///
/// Non-string items and blanks are dropped, duplicates removed in order, and
/// the list capped at `max_keywords`. Fewer than two keywords counts as failure.
pub fn parse_keywords(reply: &str, max_keywords: usize) -> Vec<String> {
    let Some(array) = json_array_slice(reply) else {
        return Vec::new();
    };
    let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(array) else {
        return Vec::new();
    };

    let keywords: Vec<String> = values
        .into_iter()
        .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .unique()
        .take(max_keywords)
        .collect();

    if keywords.len() < MIN_KEYWORDS {
        Vec::new()
    } else {
        keywords
    }
}
