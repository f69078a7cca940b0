//! YAML configuration.
//!
//! Every section is optional; missing values fall back to the defaults below.
//!
//! ```yaml
//! llm:
//!   api_base: https://api.openai.com/v1
//!   model: gpt-4
//!   rate_limit_delay_secs: 40
//! search:
//!   per_site_quota: 3
//!   sites: [bbc.com, hani.co.kr]
//! extraction:
//!   rules:
//!     bbc.com:
//!       - { tag: main, class: bbc-fa0wmp }
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

use crate::scrapers::{BROWSER_USER_AGENT, RuleTable};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("missing setting: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub extraction: ExtractionConfig,
}

/// OpenAI-compatible generation backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    pub rate_limit_delay_secs: u64,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            rate_limit_delay_secs: 40,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs(self.rate_limit_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub per_site_quota: usize,
    pub sites: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://www.googleapis.com/customsearch/v1".to_string(),
            per_site_quota: 3,
            sites: [
                "bbc.com",
                "khan.co.kr",
                "brunch.co.kr",
                "hani.co.kr",
                "ytn.co.kr",
                "sisain.co.kr",
                "news.sbs.co.kr",
                "h21.hani.co.kr",
                "ohmynews.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            timeout_secs: 30,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub rules: RuleTable,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            timeout_secs: 30,
            rules: RuleTable::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    pub fn from_yaml(text: &str, path: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: path.to_string(),
            source,
        })
    }

    /// Load `path`, or the defaults when no path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        let path_str = path.display().to_string();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path_str.clone(),
                source,
            })?;
        let config = Self::from_yaml(&text, &path_str)?;
        info!(path = %path_str, sites = config.search.sites.len(), "Loaded configuration");
        Ok(config)
    }
}
