//! Parsing strategies: turn an HTML page plus a list of extraction rules into
//! [`ParseResult`]s.
//!
//! The strategy family is closed. [`ParsingStrategy`] is an enum over the five
//! extractors and is built through [`ParsingStrategy::create`] or, from job
//! files, [`ParsingStrategy::create_by_name`]:
//!
//! | name           | legacy name           | output                                   |
//! |----------------|-----------------------|------------------------------------------|
//! | `content`      | `general_parser`      | one result per matched value             |
//! | `link`         | `link_parser`         | `(link text, absolute url)` pairs        |
//! | `list_item`    | `list_item_parser`    | one `item` record per row                |
//! | `datetime`     | `datetime_parser`     | content values passed through a formatter |
//! | `general_news` | `general_news_parser` | title, author, publish date and body     |
//!
//! Selector errors never abort a parse: the offending rule is logged and
//! skipped.

mod content;
mod datetime;
pub mod document;
mod link;
mod list_item;
mod news;
pub mod xpath;

pub use content::ContentParser;
pub use datetime::DatetimeParser;
pub use document::{Document, Selection};
pub use link::{DEFAULT_LINK_PATTERN, LinkParser};
pub use list_item::ListItemParser;
pub use news::NewsParser;

use crate::error::{EngineError, Result};
use crate::models::{ExtractionRule, ParseResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Caller-supplied normalisation applied by the datetime parser.
pub type DatetimeFormatter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Names of the parsing strategies, as written in job files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    #[serde(alias = "general_parser", alias = "html_parser")]
    Content,
    #[serde(alias = "link_parser")]
    Link,
    #[serde(alias = "list_item_parser")]
    ListItem,
    #[serde(alias = "datetime_parser")]
    Datetime,
    #[serde(alias = "general_news_parser")]
    GeneralNews,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::Content => "content",
            ParserKind::Link => "link",
            ParserKind::ListItem => "list_item",
            ParserKind::Datetime => "datetime",
            ParserKind::GeneralNews => "general_news",
        }
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParserKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "content" | "general_parser" | "html_parser" => Ok(ParserKind::Content),
            "link" | "link_parser" => Ok(ParserKind::Link),
            "list_item" | "list_item_parser" => Ok(ParserKind::ListItem),
            "datetime" | "datetime_parser" => Ok(ParserKind::Datetime),
            "general_news" | "general_news_parser" => Ok(ParserKind::GeneralNews),
            other => Err(EngineError::UnknownStrategy {
                family: "parsing",
                name: other.to_string(),
            }),
        }
    }
}

/// Construction options shared by the strategy factory.
///
/// Each strategy reads the options it understands and ignores the rest.
#[derive(Clone, Default)]
pub struct ParserOptions {
    /// Base URL for the link parser; validated against the link pattern.
    pub base_url: Option<String>,
    /// Replaces [`DEFAULT_LINK_PATTERN`] for the link parser.
    pub link_pattern: Option<Regex>,
    pub datetime_formatter: Option<DatetimeFormatter>,
}

impl fmt::Debug for ParserOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserOptions")
            .field("base_url", &self.base_url)
            .field("link_pattern", &self.link_pattern.as_ref().map(Regex::as_str))
            .field("datetime_formatter", &self.datetime_formatter.as_ref().map(|_| ".."))
            .finish()
    }
}

impl ParserOptions {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_link_pattern(mut self, pattern: Regex) -> Self {
        self.link_pattern = Some(pattern);
        self
    }

    pub fn with_datetime_formatter(mut self, formatter: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.datetime_formatter = Some(Arc::new(formatter));
        self
    }
}

/// A parsing strategy, selected at runtime.
#[derive(Debug, Clone)]
pub enum ParsingStrategy {
    Content(ContentParser),
    Link(LinkParser),
    ListItem(ListItemParser),
    Datetime(DatetimeParser),
    GeneralNews(NewsParser),
}

impl ParsingStrategy {
    /// Build the strategy for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidBaseUrl`] when a link parser is given a
    /// base URL that fails its link pattern.
    pub fn create(kind: ParserKind, options: ParserOptions) -> Result<Self> {
        let strategy = match kind {
            ParserKind::Content => ParsingStrategy::Content(ContentParser),
            ParserKind::Link => {
                let mut parser = match options.link_pattern {
                    Some(pattern) => LinkParser::with_pattern(pattern),
                    None => LinkParser::new(),
                };
                if let Some(base_url) = options.base_url {
                    parser.set_base_url(base_url)?;
                }
                ParsingStrategy::Link(parser)
            }
            ParserKind::ListItem => ParsingStrategy::ListItem(ListItemParser),
            ParserKind::Datetime => ParsingStrategy::Datetime(DatetimeParser::new(options.datetime_formatter)),
            ParserKind::GeneralNews => ParsingStrategy::GeneralNews(NewsParser),
        };
        Ok(strategy)
    }

    /// Build a strategy from its configured name.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownStrategy`] for names outside the family, plus
    /// the errors of [`ParsingStrategy::create`].
    pub fn create_by_name(name: &str, options: ParserOptions) -> Result<Self> {
        Self::create(name.parse()?, options)
    }

    pub fn kind(&self) -> ParserKind {
        match self {
            ParsingStrategy::Content(_) => ParserKind::Content,
            ParsingStrategy::Link(_) => ParserKind::Link,
            ParsingStrategy::ListItem(_) => ParserKind::ListItem,
            ParsingStrategy::Datetime(_) => ParserKind::Datetime,
            ParsingStrategy::GeneralNews(_) => ParserKind::GeneralNews,
        }
    }

    pub fn parse(&self, html: &str, rules: &[ExtractionRule]) -> Vec<ParseResult> {
        let document = Document::parse(html);
        match self {
            ParsingStrategy::Content(parser) => parser.parse(&document, rules),
            ParsingStrategy::Link(parser) => parser.parse(&document, rules),
            ParsingStrategy::ListItem(parser) => parser.parse(&document, rules),
            ParsingStrategy::Datetime(parser) => parser.parse(&document, rules),
            ParsingStrategy::GeneralNews(parser) => parser.parse(&document),
        }
    }

    /// Base URL of a link parser; `None` for every other strategy.
    pub fn base_url(&self) -> Option<&str> {
        match self {
            ParsingStrategy::Link(parser) => parser.base_url(),
            _ => None,
        }
    }

    /// Set the base URL used to resolve relative links.
    ///
    /// Only the link parser resolves links; on other strategies this is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidBaseUrl`] if the URL fails the link pattern.
    pub fn set_base_url(&mut self, base_url: impl Into<String>) -> Result<()> {
        match self {
            ParsingStrategy::Link(parser) => parser.set_base_url(base_url),
            _ => Ok(()),
        }
    }
}

/// Evaluate a rule's selector, logging and swallowing selector errors.
pub(crate) fn select_logged<'d>(document: &'d Document, rule: &ExtractionRule) -> Option<Vec<Selection<'d>>> {
    match document.select_rule(rule) {
        Ok(selections) => Some(selections),
        Err(e) => {
            warn!(field = rule.field_key(), error = %e, "Skipping extraction rule");
            None
        }
    }
}
