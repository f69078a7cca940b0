//! Text-generation backend access with rate-limit retry.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait for sending a chat prompt and receiving text
//! - [`OpenAiChat`]: OpenAI-compatible `/chat/completions` client
//! - [`RateLimitRetry`]: decorator that waits and retries on throttling
//!
//! # Retry Strategy
//!
//! Only [`AskError::RateLimited`] is retried. The wait is fixed (40 seconds
//! by default) and the number of attempts is unbounded. Every other error is
//! returned to the caller on the first occurrence.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::utils::truncate_for_log;

/// Default wait before retrying a throttled request.
pub const RATE_LIMIT_DELAY: Duration = Duration::from_secs(40);

/// Failure kinds reported by a generation backend.
#[derive(Debug, Error)]
pub enum AskError {
    /// The backend asked us to slow down (HTTP 429).
    #[error("rate limited by generation backend: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("generation API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("unexpected generation response: {0}")]
    Parse(String),
}

impl AskError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AskError::RateLimited(_))
    }
}

/// A two-role chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    /// Task instructions.
    pub system: String,
    /// Serialized feedback plus query or candidate list.
    pub user: String,
    pub max_tokens: u32,
}

/// Trait for async LLM interaction.
///
/// Implementors send a [`ChatPrompt`] and return the raw completion text.
/// Decorators such as [`RateLimitRetry`] wrap another implementor.
pub trait AskAsync {
    async fn ask(&self, prompt: &ChatPrompt) -> Result<String, AskError>;
}

impl<T: AskAsync> AskAsync for &T {
    async fn ask(&self, prompt: &ChatPrompt) -> Result<String, AskError> {
        (**self).ask(prompt).await
    }
}

/// Wrapper that retries throttled requests after a fixed delay, forever.
pub struct RateLimitRetry<T> {
    inner: T,
    delay: Duration,
}

impl<T: AskAsync> RateLimitRetry<T> {
    pub fn new(inner: T, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl<T> fmt::Debug for RateLimitRetry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitRetry")
            .field("delay", &self.delay)
            .finish()
    }
}

impl<T: AskAsync> AskAsync for RateLimitRetry<T> {
    #[instrument(level = "info", skip_all)]
    async fn ask(&self, prompt: &ChatPrompt) -> Result<String, AskError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.ask(prompt).await {
                Err(e) if e.is_rate_limit() => {
                    attempt += 1;
                    warn!(
                        attempt,
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        delay = ?self.delay,
                        error = %e,
                        "Rate limit reached; retrying after delay"
                    );
                    sleep(self.delay).await;
                }
                other => return other,
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completion client.
#[derive(Clone)]
pub struct OpenAiChat {
    http: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl fmt::Debug for OpenAiChat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiChat")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiChat {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AskError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AskError::Network(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

impl AskAsync for OpenAiChat {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, prompt: &ChatPrompt) -> Result<String, AskError> {
        let t0 = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.0,
            max_tokens: prompt.max_tokens,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Generation request failed");
                AskError::Network(e.to_string())
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(AskError::RateLimited(truncate_for_log(&body, 300)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %truncate_for_log(&body, 300), "Generation API error");
            return Err(AskError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AskError::Parse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AskError::Parse("response carried no choices".into()))?;

        info!(elapsed_ms = t0.elapsed().as_millis(), "Generation call succeeded");
        debug!(content = %truncate_for_log(&content, 300), "Generation response");
        Ok(content)
    }
}

/// Scripted backends for tests.
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued replies in order and records every prompt it sees.
    /// Once the queue is drained it answers with an API error.
    #[derive(Default)]
    pub struct ScriptedChat {
        replies: Mutex<VecDeque<Result<String, AskError>>>,
        prompts: Mutex<Vec<ChatPrompt>>,
    }

    impl ScriptedChat {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: &str) -> Self {
            self.push(Ok(text.to_string()))
        }

        pub fn fail(self, error: AskError) -> Self {
            self.push(Err(error))
        }

        fn push(self, reply: Result<String, AskError>) -> Self {
            self.replies.lock().unwrap().push_back(reply);
            self
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub fn prompts(&self) -> Vec<ChatPrompt> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl AskAsync for ScriptedChat {
        async fn ask(&self, prompt: &ChatPrompt) -> Result<String, AskError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(AskError::Api {
                        status: 500,
                        body: "script exhausted".to_string(),
                    })
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedChat;
    use super::*;

    fn prompt() -> ChatPrompt {
        ChatPrompt {
            system: "sys".to_string(),
            user: "user".to_string(),
            max_tokens: 50,
        }
    }

    #[tokio::test]
    async fn test_retry_waits_out_rate_limits() {
        let chat = ScriptedChat::new()
            .fail(AskError::RateLimited("slow down".into()))
            .fail(AskError::RateLimited("slow down".into()))
            .reply("ok");
        let api = RateLimitRetry::new(&chat, Duration::ZERO);

        assert_eq!(api.ask(&prompt()).await.unwrap(), "ok");
        assert_eq!(chat.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_other_errors() {
        let chat = ScriptedChat::new()
            .fail(AskError::Network("connection reset".into()))
            .reply("never reached");
        let api = RateLimitRetry::new(&chat, Duration::ZERO);

        let err = api.ask(&prompt()).await.unwrap_err();
        assert!(matches!(err, AskError::Network(_)));
        assert_eq!(chat.calls(), 1);
    }

    #[test]
    fn test_error_kind() {
        assert!(AskError::RateLimited(String::new()).is_rate_limit());
        assert!(!AskError::Parse(String::new()).is_rate_limit());
        let api = AskError::Api {
            status: 401,
            body: "bad key".into(),
        };
        assert!(!api.is_rate_limit());
        assert!(api.to_string().contains("401"));
    }

    #[test]
    fn test_client_trims_base_url() {
        let chat = OpenAiChat::new(
            "https://api.example.com/v1/",
            "sk-test",
            "gpt-4",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(chat.api_base, "https://api.example.com/v1");
        assert!(!format!("{chat:?}").contains("sk-test"));
    }
}
