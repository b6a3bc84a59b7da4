//! Ready-made crawl controls: early-stop conditions and per-level URL filters.

use crate::error::{EngineError, Result};
use crate::models::CrawlResult;
use regex::Regex;
use std::time::{Duration, Instant};

/// Decides whether a link found at one depth level may be visited.
pub type UrlFilter = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Keep crawling while fewer than `max_pages` pages have been visited.
///
/// The condition is checked once per expanded page, so a crawl can overshoot
/// by the number of links on the last page it expands.
pub fn stop_after_pages(max_pages: usize) -> impl FnMut(&[CrawlResult]) -> bool {
    move |path: &[CrawlResult]| path.len() < max_pages
}

/// Keep crawling until `budget` has elapsed since this call.
pub fn stop_after(budget: Duration) -> impl FnMut(&[CrawlResult]) -> bool {
    let started = Instant::now();
    move |_: &[CrawlResult]| started.elapsed() < budget
}

/// One filter per depth level: links found on a page at depth `i` are
/// visited only if they match `patterns[i]`.
///
/// # Errors
///
/// [`EngineError::Config`] naming the first pattern that is not a valid
/// regex.
pub fn url_filters_from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<UrlFilter>> {
    patterns
        .iter()
        .map(|pattern| {
            let pattern = pattern.as_ref();
            let re = Regex::new(pattern)
                .map_err(|e| EngineError::Config(format!("invalid url pattern {pattern:?}: {e}")))?;
            Ok(Box::new(move |url: &str| re.is_match(url)) as UrlFilter)
        })
        .collect()
}
