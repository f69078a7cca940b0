//! # Feedback News
//!
//! Recommends one news article at a time from a fixed set of outlets and
//! refines the next recommendation from the user's natural-language feedback.
//!
//! ## Usage
//!
//! ```sh
//! feedback_news --config ./config.yaml
//! ```
//!
//! ## Architecture
//!
//! Each round runs a short pipeline:
//! 1. **Feedback**: append the user's line to the [`models::FeedbackLog`]
//! 2. **Keywords**: ask the model for 2–N search keywords
//! 3. **Search**: page through site-scoped Google results into a candidate pool
//! 4. **Recommend**: let the model pick a candidate, scrape its body, and
//!    discard candidates until one has enough text

use clap::Parser;
use std::error::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod keywords;
mod models;
mod recommend;
mod scrapers;
mod search;
mod selector;
mod session;
mod utils;

use api::OpenAiChat;
use cli::Cli;
use config::{AppConfig, ConfigError};
use keywords::KeywordGenerator;
use scrapers::{BodyExtractor, HttpFetcher};
use search::{CandidateSearch, GoogleCustomSearch};
use selector::ArticleSelector;
use session::{RoundSettings, Session, render};

const QUIT_COMMANDS: [&str; 3] = ["quit", "exit", ":q"];

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // A missing .env file is fine; real environment variables still apply.
    let dotenv = dotenvy::dotenv();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("feedback_news starting up");
    debug!(dotenv = ?dotenv.ok(), "Environment loaded");

    let args = Cli::parse();
    debug!(?args.config, ?args.sites, ?args.format, "Parsed CLI arguments");

    let config = AppConfig::load(args.config.as_deref()).await?;
    let openai_api_key = args
        .openai_api_key
        .clone()
        .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
    let google_api_key = args
        .google_api_key
        .clone()
        .ok_or(ConfigError::Missing("GOOGLE_API_KEY"))?;
    let google_engine_id = args
        .google_search_engine_id
        .clone()
        .ok_or(ConfigError::Missing("GOOGLE_SEARCH_ENGINE_ID"))?;

    let chat = OpenAiChat::new(
        &config.llm.api_base,
        openai_api_key,
        &config.llm.model,
        config.llm.timeout(),
    )?;
    let google = GoogleCustomSearch::new(
        &config.search.endpoint,
        google_api_key,
        google_engine_id,
        config.search.timeout(),
    )?;
    let fetcher = HttpFetcher::new(&config.extraction.user_agent, config.extraction.timeout())?;

    let settings = RoundSettings {
        sites: args.sites.clone().unwrap_or_else(|| config.search.sites.clone()),
        per_site_quota: args
            .per_site
            .map(usize::from)
            .unwrap_or(config.search.per_site_quota)
            .max(1),
        max_keywords: usize::from(args.max_keywords),
    };
    info!(
        sites = settings.sites.len(),
        per_site_quota = settings.per_site_quota,
        max_keywords = settings.max_keywords,
        model = %config.llm.model,
        "Session configured"
    );

    let delay = config.llm.rate_limit_delay();
    let mut session = Session::new(
        KeywordGenerator::new(chat.clone(), delay),
        CandidateSearch::new(google),
        ArticleSelector::new(chat, delay),
        BodyExtractor::new(fetcher, config.extraction.rules.clone()),
        settings,
        &args.query,
    );

    let mut rounds = 0usize;
    if args.once {
        let outcome = session.round(args.feedback.as_deref().unwrap_or("")).await?;
        println!("{}", render(&outcome, args.format));
        rounds += 1;
    } else {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stderr = tokio::io::stderr();
        loop {
            stderr
                .write_all(b"feedback (blank for none, 'quit' to stop)> ")
                .await?;
            stderr.flush().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            if QUIT_COMMANDS.contains(&line.trim()) {
                break;
            }

            match session.round(&line).await {
                Ok(outcome) => println!("{}", render(&outcome, args.format)),
                Err(e) => {
                    error!(error = %e, "Recommendation round failed");
                    return Err(e.into());
                }
            }
            rounds += 1;
            debug!(
                next_query = %session.query().text,
                previous_round_empty = session.query().previous_round_empty,
                "Prepared next round"
            );
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        rounds,
        feedback_entries = session.feedback().len(),
        "Session complete"
    );
    Ok(())
}
