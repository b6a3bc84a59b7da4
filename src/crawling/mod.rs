//! Crawling strategies: link traversal from a start URL.
//!
//! A [`CrawlingStrategy`] owns a [`Fetcher`], a link-extracting
//! [`ParsingStrategy`] and a start URL. Each call to
//! [`CrawlingStrategy::crawl`] walks the site from the start URL and returns
//! every page it visited:
//!
//! 1. fetch the start URL at depth 0
//! 2. pop a page from the frontier, point the parser at the page's directory
//!    and extract its links
//! 3. fetch, as one bounded batch, every link that is unvisited, passes the
//!    URL filter for the page's depth and is no deeper than `max_depth`
//! 4. repeat until the frontier is empty or the early-stop control says stop
//!
//! Depth is measured against the start URL: the start URL itself is 0, a URL
//! containing it is one level per non-empty path segment after it, and any
//! other URL is infinitely deep (never visited, never expanded).
//!
//! The frontier decides the traversal order: FIFO for [`CrawlerKind::Bfs`],
//! LIFO for [`CrawlerKind::Dfs`] and highest priority first for
//! [`CrawlerKind::Prioritized`].

mod control;
mod frontier;

pub use control::{UrlFilter, stop_after, stop_after_pages, url_filters_from_patterns};

use crate::error::{EngineError, Result};
use crate::fetcher::{Fetcher, RequestClient};
use crate::models::{CrawlResult, ExtractionRule};
use crate::parsing::ParsingStrategy;
use crate::throttle::run_bounded;
use frontier::Frontier;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Priority of a fetched page in a prioritized crawl; higher is expanded
/// first.
pub type PriorityFn = Arc<dyn Fn(&CrawlResult) -> i64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrawlerKind {
    #[serde(rename = "bfs_crawler", alias = "bfs")]
    Bfs,
    #[serde(rename = "dfs_crawler", alias = "dfs")]
    Dfs,
    #[serde(rename = "prioritized_crawler", alias = "prioritized")]
    Prioritized,
}

impl CrawlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlerKind::Bfs => "bfs_crawler",
            CrawlerKind::Dfs => "dfs_crawler",
            CrawlerKind::Prioritized => "prioritized_crawler",
        }
    }
}

impl fmt::Display for CrawlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlerKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "bfs_crawler" | "bfs" => Ok(CrawlerKind::Bfs),
            "dfs_crawler" | "dfs" => Ok(CrawlerKind::Dfs),
            "prioritized_crawler" | "prioritized" => Ok(CrawlerKind::Prioritized),
            other => Err(EngineError::UnknownStrategy {
                family: "crawling",
                name: other.to_string(),
            }),
        }
    }
}

/// Tuning shared by every crawler kind.
#[derive(Clone)]
pub struct CrawlOptions {
    /// Cap on concurrent fetches of one page's links.
    pub max_concurrency: usize,
    /// Page priority for [`CrawlerKind::Prioritized`]; defaults to preferring
    /// shallower pages.
    pub priority: Option<PriorityFn>,
    /// Query parameters sent with every request.
    pub request_params: Vec<(String, String)>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 50,
            priority: None,
            request_params: Vec::new(),
        }
    }
}

impl fmt::Debug for CrawlOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlOptions")
            .field("max_concurrency", &self.max_concurrency)
            .field("priority", &self.priority.as_ref().map(|_| ".."))
            .field("request_params", &self.request_params)
            .finish()
    }
}

impl CrawlOptions {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_priority(mut self, priority: impl Fn(&CrawlResult) -> i64 + Send + Sync + 'static) -> Self {
        self.priority = Some(Arc::new(priority));
        self
    }

    pub fn with_request_params(mut self, params: Vec<(String, String)>) -> Self {
        self.request_params = params;
        self
    }
}

/// A crawler bound to one fetcher, one parser and one start URL.
pub struct CrawlingStrategy<C> {
    kind: CrawlerKind,
    fetcher: Fetcher<C>,
    parser: ParsingStrategy,
    start_url: String,
    url_queue: VecDeque<(String, usize)>,
    options: CrawlOptions,
}

impl<C> fmt::Debug for CrawlingStrategy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlingStrategy")
            .field("kind", &self.kind)
            .field("start_url", &self.start_url)
            .field("queued", &self.url_queue.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<C: RequestClient> CrawlingStrategy<C> {
    /// Build a crawler and seed its queue with `start_url`.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidBaseUrl`] when the parser rejects the start URL
    /// as a base URL.
    pub fn create(
        kind: CrawlerKind,
        fetcher: Fetcher<C>,
        start_url: impl Into<String>,
        parser: ParsingStrategy,
        options: CrawlOptions,
    ) -> Result<Self> {
        let mut crawler = Self {
            kind,
            fetcher,
            parser,
            start_url: String::new(),
            url_queue: VecDeque::new(),
            options,
        };
        crawler.set_start_url(start_url)?;
        Ok(crawler)
    }

    /// Build a crawler from its configured name (`bfs_crawler`,
    /// `dfs_crawler`, `prioritized_crawler`).
    pub fn create_by_name(
        name: &str,
        fetcher: Fetcher<C>,
        start_url: impl Into<String>,
        parser: ParsingStrategy,
        options: CrawlOptions,
    ) -> Result<Self> {
        Self::create(name.parse()?, fetcher, start_url, parser, options)
    }

    pub fn kind(&self) -> CrawlerKind {
        self.kind
    }

    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    pub fn fetcher(&self) -> &Fetcher<C> {
        &self.fetcher
    }

    /// Point the crawler at a new start URL, resetting its queue.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidBaseUrl`] from the parser; the crawler is left
    /// unchanged.
    pub fn set_start_url(&mut self, start_url: impl Into<String>) -> Result<()> {
        let start_url = start_url.into();
        self.parser.set_base_url(start_url.as_str())?;
        self.url_queue.clear();
        if !start_url.is_empty() {
            self.url_queue.push_back((start_url.clone(), 0));
        }
        self.start_url = start_url;
        Ok(())
    }

    /// Queue an extra entry. A crawl refuses to start with more than one
    /// queued entry.
    pub fn seed(&mut self, url: impl Into<String>) {
        self.url_queue.push_back((url.into(), 0));
    }

    /// Depth of `url` relative to the start URL; `None` means infinitely deep.
    pub fn depth_of(&self, url: &str) -> Option<usize> {
        if url == self.start_url {
            return Some(0);
        }
        let end = url.find(self.start_url.as_str())? + self.start_url.len();
        Some(url[end..].split('/').filter(|segment| !segment.is_empty()).count())
    }

    /// Crawl from the start URL.
    ///
    /// # Arguments
    ///
    /// * `rules` - link extraction rules handed to the parser on every page
    /// * `max_depth` - deepest level, relative to the start URL, to visit
    /// * `url_filters` - `url_filters[d]` gates links found on depth-`d` pages;
    ///   missing levels accept everything
    /// * `early_stop` - called with the pages visited so far before each page
    ///   is expanded; returning `false` ends the crawl
    /// * `result_filter` - selects which visited pages are returned
    ///
    /// # Returns
    ///
    /// Visited pages in visiting order. Each URL is fetched at most once per
    /// call; pages whose fetch came back empty are included.
    ///
    /// # Errors
    ///
    /// - [`EngineError::QueueNotProperlyInitialized`] when more than one entry
    ///   was queued
    /// - [`EngineError::InvalidBaseUrl`] when a visited page's directory is
    ///   rejected as a base URL
    #[instrument(level = "info", skip_all, fields(kind = %self.kind, start_url = %self.start_url, max_depth = max_depth))]
    pub async fn crawl<S, F>(
        &mut self,
        rules: &[ExtractionRule],
        max_depth: usize,
        url_filters: &[UrlFilter],
        mut early_stop: S,
        result_filter: F,
    ) -> Result<Vec<CrawlResult>>
    where
        S: FnMut(&[CrawlResult]) -> bool,
        F: Fn(&CrawlResult) -> bool,
    {
        if self.url_queue.len() > 1 {
            return Err(EngineError::QueueNotProperlyInitialized(self.url_queue.len()));
        }
        if self.url_queue.is_empty() {
            self.url_queue.push_back((self.start_url.clone(), 0));
        }
        let Some((start_url, start_depth)) = self.url_queue.pop_front() else {
            return Ok(Vec::new());
        };

        let mut frontier = match self.kind {
            CrawlerKind::Bfs => Frontier::fifo(),
            CrawlerKind::Dfs => Frontier::lifo(),
            CrawlerKind::Prioritized => Frontier::priority(),
        };
        let mut visited: HashSet<String> = HashSet::new();
        let mut path: Vec<CrawlResult> = Vec::new();

        visited.insert(start_url.clone());
        match self.fetcher.fetch(&start_url, &self.options.request_params).await {
            Ok((_, body)) => {
                path.push(CrawlResult::new(start_url, body, start_depth, None));
                frontier.push(0, self.priority_of(&path[0]));
            }
            Err(e) => warn!(url = %start_url, error = %e, "Start page could not be fetched"),
        }

        while !frontier.is_empty() && early_stop(&path) {
            let Some(index) = frontier.pop() else {
                break;
            };
            let node = &path[index];
            let (node_url, node_id) = (node.url().to_string(), node.id());
            let Some(depth) = self.depth_of(&node_url) else {
                debug!(url = %node_url, "Page is outside the start url; not expanding");
                continue;
            };
            if node.page_source().is_empty() {
                continue;
            }

            self.parser.set_base_url(directory_of(&node_url))?;
            let links = self.parser.parse(node.page_source(), rules);
            let url_filter = url_filters.get(depth);

            let mut batch: Vec<(String, usize)> = Vec::new();
            for link in &links {
                let Some(url) = link.value.as_text() else {
                    continue;
                };
                if visited.contains(url) || !url_filter.is_none_or(|accept| accept(url)) {
                    continue;
                }
                let Some(link_depth) = self.depth_of(url).filter(|d| *d <= max_depth) else {
                    continue;
                };
                visited.insert(url.to_string());
                batch.push((url.to_string(), link_depth));
            }
            if batch.is_empty() {
                continue;
            }
            debug!(url = %node_url, depth, links = links.len(), to_visit = batch.len(), "Expanding page");

            let fetcher = &self.fetcher;
            let params = &self.options.request_params;
            let outcomes = run_bounded(
                self.options.max_concurrency,
                batch.iter().map(|(url, _)| fetcher.fetch(url, params)),
            )
            .await;

            for ((url, link_depth), outcome) in batch.into_iter().zip(outcomes) {
                match outcome {
                    Ok((_, body)) => {
                        let page = CrawlResult::new(url, body, link_depth, Some(node_id));
                        let priority = self.priority_of(&page);
                        path.push(page);
                        frontier.push(path.len() - 1, priority);
                    }
                    Err(e) => warn!(%url, error = %e, "Skipping page"),
                }
            }
        }

        let visited_pages = path.len();
        let results: Vec<CrawlResult> = path.into_iter().filter(|page| result_filter(page)).collect();
        info!(visited = visited_pages, returned = results.len(), "Crawl finished");
        Ok(results)
    }

    fn priority_of(&self, page: &CrawlResult) -> i64 {
        match &self.options.priority {
            Some(priority) => priority(page),
            None => -(page.relative_depth() as i64),
        }
    }
}

/// Directory part of `url`, used as the base for its relative links.
fn directory_of(url: &str) -> String {
    Url::parse(url)
        .and_then(|parsed| parsed.join("./"))
        .map(String::from)
        .unwrap_or_else(|_| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::ScriptedClient;
    use crate::parsing::{ParserKind, ParserOptions};
    use std::time::Duration;

    const START: &str = "http://x.com/news/";

    fn site() -> ScriptedClient {
        ScriptedClient::new()
            .page(
                START,
                r#"<a href="a.html">A</a> <a href="/news/b.html">B</a>
                   <a href="http://other.com/x.html">elsewhere</a> <a href="a.html">A again</a>"#,
            )
            .page(
                "http://x.com/news/a.html",
                r#"<a href="/news/">home</a> <a href="a/x.html">X</a> <a href="b.html">B</a>"#,
            )
            .page("http://x.com/news/b.html", r#"<a href="b/y.html">Y</a>"#)
            .page("http://x.com/news/a/x.html", r#"<a href="../a/x.html">self</a>"#)
            .page("http://x.com/news/b/y.html", "<p>leaf</p>")
    }

    fn crawler(client: &ScriptedClient, kind: CrawlerKind, options: CrawlOptions) -> CrawlingStrategy<&ScriptedClient> {
        let fetcher = Fetcher::new(client, 1).with_backoff(Duration::ZERO, Duration::ZERO);
        let parser = ParsingStrategy::create(ParserKind::Link, ParserOptions::default()).unwrap();
        CrawlingStrategy::create(kind, fetcher, START, parser, options).unwrap()
    }

    fn urls(pages: &[CrawlResult]) -> Vec<&str> {
        pages.iter().map(|p| p.url().trim_start_matches("http://x.com/news/")).collect()
    }

    fn rules() -> Vec<ExtractionRule> {
        vec![ExtractionRule::css("a").link()]
    }

    #[tokio::test]
    async fn test_bfs_visits_each_url_once() {
        let client = site();
        let mut bfs = crawler(&client, CrawlerKind::Bfs, CrawlOptions::default());
        let pages = bfs.crawl(&rules(), 2, &[], |_| true, |_| true).await.unwrap();

        assert_eq!(urls(&pages), vec!["", "a.html", "b.html", "a/x.html", "b/y.html"]);
        assert!(client.call_counts().values().all(|calls| *calls == 1));
        assert_eq!(client.calls("http://other.com/x.html"), 0);
    }

    #[tokio::test]
    async fn test_depths_and_neighbors() {
        let client = site();
        let mut bfs = crawler(&client, CrawlerKind::Bfs, CrawlOptions::default());
        let pages = bfs.crawl(&rules(), 2, &[], |_| true, |_| true).await.unwrap();

        let depths: Vec<usize> = pages.iter().map(CrawlResult::relative_depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 2, 2]);
        assert!(pages[0].neighbors().is_empty());
        assert_eq!(pages[3].neighbors(), &[pages[1].id()]);
        assert_eq!(pages[4].neighbors(), &[pages[2].id()]);
        for page in &pages {
            assert!(page.relative_depth() <= 2);
            assert_eq!(bfs.depth_of(page.url()), Some(page.relative_depth()));
        }
    }

    #[tokio::test]
    async fn test_max_depth_limits_crawl() {
        let client = site();
        let mut bfs = crawler(&client, CrawlerKind::Bfs, CrawlOptions::default());
        let pages = bfs.crawl(&rules(), 1, &[], |_| true, |_| true).await.unwrap();
        assert_eq!(urls(&pages), vec!["", "a.html", "b.html"]);
        assert_eq!(client.calls("http://x.com/news/a/x.html"), 0);
    }

    #[test]
    fn test_depth_of() {
        let client = ScriptedClient::new();
        let bfs = crawler(&client, CrawlerKind::Bfs, CrawlOptions::default());
        assert_eq!(bfs.depth_of(START), Some(0));
        assert_eq!(bfs.depth_of("http://x.com/news/a/b//c.html"), Some(3));
        assert_eq!(bfs.depth_of("http://x.com/sports/a.html"), None);
    }

    #[tokio::test]
    async fn test_dfs_and_prioritized_orders() {
        let client = site();
        let mut dfs = crawler(&client, CrawlerKind::Dfs, CrawlOptions::default());
        let pages = dfs.crawl(&rules(), 2, &[], |_| true, |_| true).await.unwrap();
        assert_eq!(urls(&pages), vec!["", "a.html", "b.html", "b/y.html", "a/x.html"]);

        let client = site();
        let mut shallow_first = crawler(&client, CrawlerKind::Prioritized, CrawlOptions::default());
        let pages = shallow_first.crawl(&rules(), 2, &[], |_| true, |_| true).await.unwrap();
        assert_eq!(urls(&pages), vec!["", "a.html", "b.html", "a/x.html", "b/y.html"]);

        let client = site();
        let options = CrawlOptions::default().with_priority(|page| i64::from(page.url().contains('b')));
        let mut prefer_b = crawler(&client, CrawlerKind::Prioritized, options);
        let pages = prefer_b.crawl(&rules(), 2, &[], |_| true, |_| true).await.unwrap();
        assert_eq!(urls(&pages), vec!["", "a.html", "b.html", "b/y.html", "a/x.html"]);
    }

    #[tokio::test]
    async fn test_filters_and_early_stop() {
        let client = site();
        let mut bfs = crawler(&client, CrawlerKind::Bfs, CrawlOptions::default());
        let filters = url_filters_from_patterns(&[r"a\.html$"]).unwrap();
        let pages = bfs
            .crawl(&rules(), 2, &filters, |_| true, |page| page.relative_depth() > 0)
            .await
            .unwrap();
        // b.html is filtered out at the start page but still reachable from a.html
        assert_eq!(urls(&pages), vec!["a.html", "a/x.html", "b.html", "b/y.html"]);

        let client = site();
        let mut bfs = crawler(&client, CrawlerKind::Bfs, CrawlOptions::default());
        let pages = bfs.crawl(&rules(), 2, &[], stop_after_pages(2), |_| true).await.unwrap();
        assert_eq!(urls(&pages), vec!["", "a.html", "b.html"]);
    }

    #[tokio::test]
    async fn test_queue_misuse_and_repeat_crawls() {
        let client = site();
        let mut bfs = crawler(&client, CrawlerKind::Bfs, CrawlOptions::default());
        bfs.seed("http://x.com/news/a.html");
        let err = bfs.crawl(&rules(), 1, &[], |_| true, |_| true).await.unwrap_err();
        assert!(matches!(err, EngineError::QueueNotProperlyInitialized(2)));

        bfs.set_start_url(START).unwrap();
        bfs.crawl(&rules(), 0, &[], |_| true, |_| true).await.unwrap();
        let again = bfs.crawl(&rules(), 0, &[], |_| true, |_| true).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(client.calls(START), 2);
    }

    #[tokio::test]
    async fn test_unreachable_pages_are_recorded_empty() {
        let client = ScriptedClient::new().page(START, r#"<a href="gone.html">gone</a>"#);
        let mut bfs = crawler(&client, CrawlerKind::Bfs, CrawlOptions::default());
        let pages = bfs.crawl(&rules(), 1, &[], |_| true, |_| true).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].page_source(), "");
    }

    #[test]
    fn test_create_by_name() {
        let client = ScriptedClient::new();
        let fetcher = Fetcher::new(&client, 1);
        let parser = ParsingStrategy::create(ParserKind::Link, ParserOptions::default()).unwrap();
        let err = CrawlingStrategy::create_by_name("random_walk", fetcher.clone(), START, parser.clone(), CrawlOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownStrategy { family: "crawling", .. }));

        let dfs = CrawlingStrategy::create_by_name("dfs_crawler", fetcher, START, parser, CrawlOptions::default()).unwrap();
        assert_eq!(dfs.kind(), CrawlerKind::Dfs);
        assert_eq!(directory_of("http://x.com/a/b"), "http://x.com/a/");
    }
}
