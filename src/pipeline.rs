//! Generic scrape job: fetch, crawl, extract and filter according to
//! [`ScrapeRules`].
//!
//! A job runs in one of two modes, picked by `max_depth`:
//!
//! - **list mode** (no `max_depth`): the start URLs are listing pages. Stage
//!   one of the parsing pipeline turns each page into records; when a second
//!   stage exists, every record's link is fetched and stage two fills in the
//!   detail fields.
//! - **crawl mode** (`max_depth` set): stage one must be a link parser. A
//!   breadth-first crawl runs from every start URL, filtered level by level
//!   with `url_patterns`, and stage two extracts fields from each page found
//!   below the start page.
//!
//! Keyword and time-range filters apply to the final records. In list mode
//! they also prune stage-one records before detail pages are fetched, as far
//! as the stage-one fields allow.

use crate::crawling::{CrawlOptions, CrawlerKind, CrawlingStrategy, url_filters_from_patterns};
use crate::error::{EngineError, Result};
use crate::fetcher::{Fetcher, RequestClient};
use crate::models::{
    CrawlResult, ExtractionRule, KeywordRules, ParseResult, ParseValue, ParsingPipeline, ScrapeRules, TimeRange,
};
use crate::parsing::{ParserKind, ParserOptions, ParsingStrategy};
use crate::throttle::run_bounded;
use crate::timefmt::{normalize_datetime_text, standardize_datetime};
use crate::utils::truncate_for_log;
use chrono::{Duration, Local, NaiveDateTime};
use itertools::Itertools;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, instrument, warn};
use url::Url;

const LINK_FIELDS: [&str; 3] = ["href", "link", "url"];
const DEFAULT_DATE_FIELD: &str = "date";

/// One extracted item: the page it describes and its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapedRecord {
    pub url: String,
    pub fields: BTreeMap<String, ParseValue>,
}

impl ScrapedRecord {
    /// First text value of `field`.
    pub fn text(&self, field: &str) -> Option<&str> {
        first_text(self.fields.get(field)?)
    }

    fn texts(&self) -> impl Iterator<Item = &str> {
        self.fields.values().flat_map(ParseValue::texts)
    }
}

fn first_text(value: &ParseValue) -> Option<&str> {
    match value {
        ParseValue::Text(text) => Some(text),
        ParseValue::List(items) => items.iter().find_map(first_text),
        ParseValue::Record(_) => None,
    }
}

/// Runs [`ScrapeRules`] against a set of start URLs.
#[derive(Debug, Clone)]
pub struct ScrapeJob<C> {
    fetcher: Fetcher<C>,
    now: Option<NaiveDateTime>,
}

impl<C: RequestClient + Clone> ScrapeJob<C> {
    pub fn new(fetcher: Fetcher<C>) -> Self {
        Self { fetcher, now: None }
    }

    /// Pin the clock used for relative dates and `past_days`.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    /// Run the job.
    ///
    /// # Errors
    ///
    /// Configuration mistakes only: an empty parsing pipeline, a crawl whose
    /// first stage is not a link parser, or an invalid URL pattern. Pages that
    /// cannot be fetched or parsed are logged and skipped.
    #[instrument(level = "info", skip_all, fields(urls = urls.len(), max_depth = ?rules.max_depth))]
    pub async fn run(&self, urls: &[String], rules: &ScrapeRules) -> Result<Vec<ScrapedRecord>> {
        let Some(first) = rules.parsing_pipeline.first() else {
            return Err(EngineError::Config("parsing_pipeline needs at least one stage".into()));
        };
        let detail = rules.parsing_pipeline.get(1);
        let now = self.now.unwrap_or_else(|| Local::now().naive_local());
        let params: Vec<(String, String)> = rules
            .request_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let records = match rules.max_depth {
            Some(max_depth) => self.run_crawl(urls, rules, first, detail, max_depth, &params).await?,
            None => self.run_list(urls, rules, first, detail, &params, now).await,
        };

        let total = records.len();
        let records: Vec<ScrapedRecord> = records
            .into_iter()
            .filter(|record| keyword_match(record, &rules.keywords))
            .filter(|record| match &rules.time_range {
                Some(range) => in_time_range(record, range, now, true),
                None => true,
            })
            .collect();
        info!(extracted = total, kept = records.len(), "Scrape job finished");
        Ok(records)
    }

    async fn run_list(
        &self,
        urls: &[String],
        rules: &ScrapeRules,
        first: &ParsingPipeline,
        detail: Option<&ParsingPipeline>,
        params: &[(String, String)],
        now: NaiveDateTime,
    ) -> Vec<ScrapedRecord> {
        let pages = self.fetch_all(urls.iter().map(String::as_str), rules.max_concurrency, params).await;
        info!(fetched = pages.len(), "Fetched listing pages");

        let mut records = Vec::new();
        for (url, body) in &pages {
            let Some(parser) = stage_parser(first, url) else {
                continue;
            };
            records.extend(records_from(first.parser, url, parser.parse(body, &first.rules)));
        }
        info!(records = records.len(), parser = %first.parser, "Parsed listing pages");

        let Some(detail) = detail else {
            return records;
        };

        let before = records.len();
        records.retain(|record| {
            exclude_match(record, &rules.keywords)
                && rules
                    .time_range
                    .as_ref()
                    .is_none_or(|range| in_time_range(record, range, now, false))
        });
        if records.len() < before {
            info!(before, after = records.len(), "Pruned listing records");
        }

        let link_field = first.rules.iter().find(|rule| rule.is_link()).map(ExtractionRule::field_key);
        let linked: Vec<(String, ScrapedRecord)> = records
            .into_iter()
            .filter_map(|record| match link_of(&record, link_field) {
                Some(link) => Some((link, record)),
                None => {
                    warn!(url = %record.url, "Listing record has no link; dropping");
                    None
                }
            })
            .collect();

        // records sharing a link share one fetch
        let detail_pages = self
            .fetch_all(
                linked.iter().map(|(link, _)| link.as_str()).unique(),
                rules.max_concurrency,
                params,
            )
            .await;
        let mut by_url: BTreeMap<&str, &str> = BTreeMap::new();
        for (url, body) in &detail_pages {
            by_url.insert(url.as_str(), body.as_str());
        }

        linked
            .iter()
            .filter_map(|(link, listing)| {
                let body = by_url.get(link.as_str())?;
                let parser = stage_parser(detail, link)?;
                let mut fields = listing.fields.clone();
                fields.extend(ParseResult::group(parser.parse(body, &detail.rules)));
                Some(ScrapedRecord {
                    url: link.clone(),
                    fields,
                })
            })
            .collect()
    }

    async fn run_crawl(
        &self,
        urls: &[String],
        rules: &ScrapeRules,
        first: &ParsingPipeline,
        detail: Option<&ParsingPipeline>,
        max_depth: usize,
        params: &[(String, String)],
    ) -> Result<Vec<ScrapedRecord>> {
        if first.parser != ParserKind::Link {
            return Err(EngineError::Config(format!(
                "crawling needs a link parser as the first pipeline stage, got {}",
                first.parser
            )));
        }
        let patterns = rules.url_patterns.clone().unwrap_or_default();
        let url_filters = url_filters_from_patterns(&patterns)?;
        let target = match patterns.last() {
            Some(pattern) => Some(
                Regex::new(pattern).map_err(|e| EngineError::Config(format!("invalid url pattern {pattern:?}: {e}")))?,
            ),
            None => None,
        };

        let mut pages: Vec<CrawlResult> = Vec::new();
        for url in urls {
            let parser = ParsingStrategy::create(ParserKind::Link, ParserOptions::default())?;
            let options = CrawlOptions::default()
                .with_max_concurrency(rules.max_concurrency)
                .with_request_params(params.to_vec());
            let mut crawler = match CrawlingStrategy::create(CrawlerKind::Bfs, self.fetcher.clone(), url.as_str(), parser, options) {
                Ok(crawler) => crawler,
                Err(e) => {
                    error!(%url, error = %e, "Cannot crawl from this url");
                    continue;
                }
            };
            let max_pages = rules.max_pages;
            let crawled = crawler
                .crawl(
                    &first.rules,
                    max_depth,
                    &url_filters,
                    |path| max_pages.is_none_or(|limit| path.len() < limit),
                    |page| page.relative_depth() > 0 && target.as_ref().is_none_or(|re| re.is_match(page.url())),
                )
                .await?;
            pages.extend(crawled);
        }
        info!(pages = pages.len(), "Crawl collected pages");

        let Some(detail) = detail else {
            return Ok(pages
                .into_iter()
                .filter(|page| !page.page_source().is_empty())
                .map(|page| ScrapedRecord {
                    url: page.url().to_string(),
                    fields: BTreeMap::new(),
                })
                .collect());
        };
        Ok(pages
            .iter()
            .filter_map(|page| {
                if page.page_source().is_empty() {
                    error!(url = %page.url(), "Failed to fetch page");
                    return None;
                }
                let parser = stage_parser(detail, page.url())?;
                Some(ScrapedRecord {
                    url: page.url().to_string(),
                    fields: ParseResult::group(parser.parse(page.page_source(), &detail.rules)),
                })
            })
            .collect())
    }

    /// Fetch through the throttler; keeps pages with a body, logs the rest.
    async fn fetch_all<'u>(
        &self,
        urls: impl Iterator<Item = &'u str>,
        max_concurrency: usize,
        params: &[(String, String)],
    ) -> Vec<(String, String)> {
        let urls: Vec<&str> = urls.collect();
        let outcomes = run_bounded(max_concurrency, urls.iter().map(|url| self.fetcher.fetch(url, params))).await;
        urls.iter()
            .zip(outcomes)
            .filter_map(|(url, outcome)| match outcome {
                Ok((url, body)) if !body.is_empty() => Some((url, body)),
                Ok(_) => {
                    error!(%url, "Failed to fetch url");
                    None
                }
                Err(e) => {
                    error!(%url, error = %e, "Failed to fetch url");
                    None
                }
            })
            .collect()
    }
}

fn stage_parser(stage: &ParsingPipeline, page_url: &str) -> Option<ParsingStrategy> {
    let options = ParserOptions::default()
        .with_base_url(page_url)
        .with_datetime_formatter(normalize_datetime_text);
    match ParsingStrategy::create(stage.parser, options) {
        Ok(parser) => Some(parser),
        Err(e) => {
            warn!(url = %page_url, stage = ?stage.name, error = %e, "Cannot parse page");
            None
        }
    }
}

fn records_from(kind: ParserKind, page_url: &str, results: Vec<ParseResult>) -> Vec<ScrapedRecord> {
    match kind {
        ParserKind::ListItem => results
            .into_iter()
            .filter_map(|result| match result.value {
                ParseValue::Record(fields) => Some(ScrapedRecord {
                    url: page_url.to_string(),
                    fields: fields.into_iter().map(|(name, cell)| (name, cell.value)).collect(),
                }),
                _ => None,
            })
            .collect(),
        ParserKind::Link => results
            .into_iter()
            .map(|result| ScrapedRecord {
                url: page_url.to_string(),
                fields: BTreeMap::from([
                    ("title".to_string(), ParseValue::Text(result.name)),
                    ("href".to_string(), result.value),
                ]),
            })
            .collect(),
        _ if results.is_empty() => Vec::new(),
        _ => vec![ScrapedRecord {
            url: page_url.to_string(),
            fields: ParseResult::group(results),
        }],
    }
}

/// Absolute link of a listing record: the stage's link field if it has one,
/// otherwise the first of `href`, `link`, `url`.
fn link_of(record: &ScrapedRecord, link_field: Option<&str>) -> Option<String> {
    let raw = link_field
        .and_then(|field| record.text(field))
        .or_else(|| LINK_FIELDS.iter().find_map(|field| record.text(field)))
        .map(str::trim)
        .filter(|link| !link.is_empty())?;
    let resolved = Url::parse(&record.url)
        .and_then(|base| base.join(raw))
        .map(String::from)
        .unwrap_or_else(|_| raw.to_string());
    Some(resolved)
}

fn keyword_match(record: &ScrapedRecord, keywords: &KeywordRules) -> bool {
    let included = keywords.include.is_empty()
        || record
            .texts()
            .any(|text| keywords.include.iter().any(|kw| text.contains(kw.as_str())));
    included && exclude_match(record, keywords)
}

fn exclude_match(record: &ScrapedRecord, keywords: &KeywordRules) -> bool {
    let hit = record
        .texts()
        .find(|text| keywords.exclude.iter().any(|kw| text.contains(kw.as_str())));
    if let Some(text) = hit {
        info!(url = %record.url, text = %truncate_for_log(text, 80), "Excluded by keyword");
    }
    hit.is_none()
}

/// Whether the record's date lies in `[start, end)`.
///
/// A record without a parseable date passes only when `strict` is false.
fn in_time_range(record: &ScrapedRecord, range: &TimeRange, now: NaiveDateTime, strict: bool) -> bool {
    let start = match range.past_days {
        // a window wider than the calendar has no lower bound
        Some(days) => Duration::try_days(days).and_then(|window| now.checked_sub_signed(window)),
        None => range.start_date.as_deref().and_then(|s| standardize_datetime(now, s)),
    };
    let end = range.end_date.as_deref().and_then(|s| standardize_datetime(now, s));
    if start.is_none() && end.is_none() {
        return true;
    }

    let field = range.date_field.as_deref().unwrap_or(DEFAULT_DATE_FIELD);
    let Some(date) = record.text(field).and_then(|text| standardize_datetime(now, text)) else {
        return !strict;
    };
    start.is_none_or(|start| date >= start) && end.is_none_or(|end| date < end)
}
