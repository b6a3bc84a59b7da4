//! # crawl_engine
//!
//! A generic engine for crawling and scraping web pages, driven entirely by
//! declarative rules.
//!
//! ## Layers
//!
//! - [`fetcher`]: retrying GET with status classification, exponential
//!   backoff and GBK/UTF-8 repair of mis-decoded pages
//! - [`throttle`]: runs a batch of futures with bounded concurrency, keeping
//!   result order and isolating failures
//! - [`parsing`]: rule-driven extractors (content, links, list items,
//!   datetimes, general news articles) over XPath, CSS, regex, class, id and
//!   text selectors
//! - [`crawling`]: breadth-first, depth-first and prioritized crawls with
//!   per-level URL filters, early stop and result filters
//! - [`pipeline`]: runs a whole [`ScrapeRules`] job over a set of start URLs
//!
//! ## Usage
//!
//! ```ignore
//! let fetcher = Fetcher::new(reqwest::Client::new(), 3);
//! let parser = ParsingStrategy::create(ParserKind::Link, ParserOptions::default())?;
//! let mut crawler = CrawlingStrategy::create(
//!     CrawlerKind::Bfs,
//!     fetcher,
//!     "http://news.x.com/",
//!     parser,
//!     CrawlOptions::default(),
//! )?;
//! let pages = crawler
//!     .crawl(&[ExtractionRule::css("a").link()], 2, &[], stop_after_pages(100), |_| true)
//!     .await?;
//! ```

pub mod config;
pub mod crawling;
pub mod encoding;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod outputs;
pub mod parsing;
pub mod pipeline;
pub mod throttle;
pub mod timefmt;
pub mod utils;

pub use config::Job;
pub use crawling::{CrawlOptions, CrawlerKind, CrawlingStrategy, stop_after, stop_after_pages, url_filters_from_patterns};
pub use error::{EngineError, Result, SelectorError};
pub use fetcher::{Fetcher, RequestClient};
pub use models::{CrawlResult, ExtractionRule, ParseResult, ParseValue, ScrapeRules, SelectorType};
pub use parsing::{ParserKind, ParserOptions, ParsingStrategy};
pub use pipeline::{ScrapeJob, ScrapedRecord};
pub use throttle::run_bounded;
