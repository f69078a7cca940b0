//! Command-line interface definitions.
//!
//! Credentials can be given as flags, environment variables, or a `.env` file.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// How a recommended article is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Recommend a news article, refined by your feedback each round.
///
/// # Examples
///
/// ```sh
/// # Interactive session: type feedback, press enter, repeat
/// feedback_news
///
/// # One round, JSON output
/// feedback_news --once -f "more about deep-sea biology" --format json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a config.yaml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// API key for the OpenAI-compatible generation backend
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Google Custom Search API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    /// Google Programmable Search Engine id (cx)
    #[arg(long, env = "GOOGLE_SEARCH_ENGINE_ID")]
    pub google_search_engine_id: Option<String>,

    /// Starting query
    #[arg(short, long, default_value = "")]
    pub query: String,

    /// Run a single round with this feedback instead of reading stdin
    #[arg(long)]
    pub once: bool,

    /// Feedback for `--once`
    #[arg(short, long, requires = "once")]
    pub feedback: Option<String>,

    /// Restrict the search to these sites (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub sites: Option<Vec<String>>,

    /// Search results to collect per site
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub per_site: Option<u16>,

    /// Maximum keywords to generate per round
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(2..))]
    pub max_keywords: u8,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
