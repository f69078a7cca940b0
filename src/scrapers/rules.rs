//! Per-domain extraction rules: which element holds an article body.

use scraper::Selector;
use serde::Deserialize;
use std::collections::HashMap;

use super::ExtractError;

/// A `tag` plus its `class` attribute. `class` may list several classes
/// separated by whitespace; an element must carry all of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtractionRule {
    pub tag: String,
    pub class: String,
}

impl ExtractionRule {
    pub fn new(tag: &str, class: &str) -> Self {
        Self {
            tag: tag.to_string(),
            class: class.to_string(),
        }
    }

    /// CSS form of the rule, e.g. `article.article_body.at_contents`.
    pub fn css(&self) -> String {
        self.class
            .split_whitespace()
            .fold(self.tag.trim().to_string(), |mut css, class| {
                css.push('.');
                css.push_str(class);
                css
            })
    }

    pub fn selector(&self) -> Result<Selector, ExtractError> {
        let css = self.css();
        Selector::parse(&css).map_err(|e| ExtractError::Selector(format!("{css}: {e}")))
    }
}

/// Domain → ordered fallback rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct RuleTable {
    rules: HashMap<String, Vec<ExtractionRule>>,
}

impl RuleTable {
    pub fn new(rules: HashMap<String, Vec<ExtractionRule>>) -> Self {
        Self { rules }
    }

    pub fn get(&self, domain: &str) -> Option<&[ExtractionRule]> {
        self.rules
            .get(domain)
            .map(Vec::as_slice)
            .filter(|rules| !rules.is_empty())
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        let table = [
            ("bbc.com", vec![ExtractionRule::new("main", "bbc-fa0wmp")]),
            ("khan.co.kr", vec![ExtractionRule::new("div", "art_body")]),
            ("brunch.co.kr", vec![ExtractionRule::new("div", "wrap_body")]),
            ("hani.co.kr", vec![ExtractionRule::new("div", "article-text")]),
            ("ytn.co.kr", vec![ExtractionRule::new("div", "vodtext")]),
            ("sisain.co.kr", vec![ExtractionRule::new("div", "article-body")]),
            ("news.sbs.co.kr", vec![ExtractionRule::new("div", "main_text")]),
            ("h21.hani.co.kr", vec![ExtractionRule::new("div", "arti-txt")]),
            (
                "ohmynews.com",
                vec![
                    ExtractionRule::new("article", "article_body at_contents article_view"),
                    ExtractionRule::new("div", "news_body"),
                ],
            ),
        ];
        Self::new(
            table
                .into_iter()
                .map(|(domain, rules)| (domain.to_string(), rules))
                .collect(),
        )
    }
}
