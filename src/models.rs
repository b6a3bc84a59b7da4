//! Data models for extraction rules, parse output, crawled pages and scrape rules.
//!
//! This module defines the core data structures passed between the engine and
//! the pipeline drivers that configure it:
//! - [`ExtractionRule`]: declarative description of one field to pull out of a page
//! - [`ParseResult`] / [`ParseValue`]: what a parsing strategy produces
//! - [`CrawlResult`]: one visited page, created once per URL by a crawl
//! - [`ScrapeRules`]: the per-job configuration a driver hands to the engine
//!
//! Rule types deserialize from YAML job files and still accept the older key
//! names (`rule_type`, `rule`, `slice_str`) used by existing service configs.

use crate::parsing::ParserKind;
use crate::utils::url_id;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// How a rule's `selector_expression` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorType {
    #[serde(alias = "XPATH")]
    Xpath,
    #[serde(alias = "CSS_SELECTOR", alias = "css")]
    CssSelector,
    #[serde(alias = "REGEX")]
    Regex,
    #[serde(alias = "CLASS_NAME")]
    ClassName,
    #[serde(alias = "ELEMENT_ID")]
    ElementId,
    #[serde(alias = "TEXT_CONTENT")]
    TextContent,
}

/// A declarative description of one field to extract from a document.
///
/// Rules are immutable once built: construct them with [`ExtractionRule::new`]
/// (or a shorthand such as [`ExtractionRule::xpath`]) and chain the `named`,
/// `link` and `with_slice` builders.
///
/// # Examples
///
/// ```ignore
/// let rule = ExtractionRule::xpath("//h3/a").named("link").link();
/// let temp = ExtractionRule::xpath("//td[2]/text()").named("high").with_slice(0, -1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractionRule {
    #[serde(default)]
    field_name: Option<String>,
    #[serde(alias = "rule_type")]
    selector_type: SelectorType,
    #[serde(alias = "rule")]
    selector_expression: String,
    #[serde(default)]
    is_link: bool,
    #[serde(default, alias = "slice_str")]
    slice: Option<(i64, i64)>,
}

impl ExtractionRule {
    pub fn new(selector_type: SelectorType, selector_expression: impl Into<String>) -> Self {
        Self {
            field_name: None,
            selector_type,
            selector_expression: selector_expression.into(),
            is_link: false,
            slice: None,
        }
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::new(SelectorType::Xpath, expression)
    }

    pub fn css(expression: impl Into<String>) -> Self {
        Self::new(SelectorType::CssSelector, expression)
    }

    pub fn named(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    /// Extract the `href` attribute instead of the text content.
    pub fn link(mut self) -> Self {
        self.is_link = true;
        self
    }

    /// Python-style `[start:end]` character slice applied by the list-item extractor.
    pub fn with_slice(mut self, start: i64, end: i64) -> Self {
        self.slice = Some((start, end));
        self
    }

    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    /// The field name, or `""` for anonymous rules.
    pub fn field_key(&self) -> &str {
        self.field_name.as_deref().unwrap_or_default()
    }

    pub fn selector_type(&self) -> SelectorType {
        self.selector_type
    }

    pub fn selector_expression(&self) -> &str {
        &self.selector_expression
    }

    pub fn is_link(&self) -> bool {
        self.is_link
    }

    pub fn slice(&self) -> Option<(i64, i64)> {
        self.slice
    }
}

/// The value half of a [`ParseResult`].
///
/// Serializes as a plain string, a JSON object (record fields keyed by name)
/// or an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParseValue {
    Text(String),
    Record(BTreeMap<String, ParseResult>),
    List(Vec<ParseValue>),
}

impl ParseValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParseValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, ParseResult>> {
        match self {
            ParseValue::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// Text of one field of a record value.
    pub fn record_text(&self, field: &str) -> Option<&str> {
        self.as_record()?.get(field)?.value.as_text()
    }

    /// Every piece of text held by this value, depth first.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            ParseValue::Text(text) => vec![text.as_str()],
            ParseValue::Record(fields) => fields.values().flat_map(|r| r.value.texts()).collect(),
            ParseValue::List(items) => items.iter().flat_map(ParseValue::texts).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ParseValue::Text(text) => text.is_empty(),
            ParseValue::Record(fields) => fields.is_empty(),
            ParseValue::List(items) => items.is_empty(),
        }
    }
}

impl From<String> for ParseValue {
    fn from(text: String) -> Self {
        ParseValue::Text(text)
    }
}

impl From<&str> for ParseValue {
    fn from(text: &str) -> Self {
        ParseValue::Text(text.to_string())
    }
}

impl Serialize for ParseValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParseValue::Text(text) => serializer.serialize_str(text),
            ParseValue::List(items) => items.serialize(serializer),
            ParseValue::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, result) in fields {
                    map.serialize_entry(name, &result.value)?;
                }
                map.end()
            }
        }
    }
}

/// One named value produced by a parsing strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ParseResult {
    pub name: String,
    pub value: ParseValue,
}

impl ParseResult {
    pub fn new(name: impl Into<String>, value: impl Into<ParseValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// An empty text result, emitted when a rule matched nothing.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, String::new())
    }

    /// Fold results into `name -> value`; repeated names collect into a list.
    pub fn group(results: impl IntoIterator<Item = ParseResult>) -> BTreeMap<String, ParseValue> {
        let mut grouped: BTreeMap<String, ParseValue> = BTreeMap::new();
        for result in results {
            match grouped.remove(&result.name) {
                None => {
                    grouped.insert(result.name, result.value);
                }
                Some(ParseValue::List(mut items)) => {
                    items.push(result.value);
                    grouped.insert(result.name, ParseValue::List(items));
                }
                Some(previous) => {
                    grouped.insert(result.name, ParseValue::List(vec![previous, result.value]));
                }
            }
        }
        grouped
    }
}

/// A page visited by a crawling strategy.
///
/// Built exactly once per visited URL and never modified afterwards, so the
/// fields are only exposed through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlResult {
    id: u64,
    url: String,
    page_source: String,
    relative_depth: usize,
    neighbors: Vec<u64>,
}

impl CrawlResult {
    pub fn new(
        url: impl Into<String>,
        page_source: impl Into<String>,
        relative_depth: usize,
        parent: Option<u64>,
    ) -> Self {
        let url = url.into();
        Self {
            id: url_id(&url),
            url,
            page_source: page_source.into(),
            relative_depth,
            neighbors: parent.into_iter().collect(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn page_source(&self) -> &str {
        &self.page_source
    }

    pub fn relative_depth(&self) -> usize {
        self.relative_depth
    }

    /// Ids of the pages this one was discovered from.
    pub fn neighbors(&self) -> &[u64] {
        &self.neighbors
    }
}

/// Keywords a record's text must (include) or must not (exclude) contain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRules {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Publication window applied to parsed dates.
///
/// `past_days` takes precedence over the explicit bounds. Dates are kept as
/// text and parsed with [`crate::timefmt`] when the filter runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub past_days: Option<i64>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    /// Record field holding the date, `date` when unset.
    #[serde(default)]
    pub date_field: Option<String>,
}

/// One stage of a parsing pipeline: which parser runs with which rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsingPipeline {
    #[serde(default)]
    pub name: Option<String>,
    pub parser: ParserKind,
    #[serde(default, alias = "parse_rules")]
    pub rules: Vec<ExtractionRule>,
}

fn default_max_concurrency() -> usize {
    50
}

fn default_max_retry() -> usize {
    1
}

/// Rules a pipeline driver passes into the engine for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeRules {
    #[serde(default)]
    pub keywords: KeywordRules,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_retry")]
    pub max_retry: usize,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub url_patterns: Option<Vec<String>>,
    #[serde(default)]
    pub parsing_pipeline: Vec<ParsingPipeline>,
    #[serde(default)]
    pub request_params: BTreeMap<String, String>,
}

impl Default for ScrapeRules {
    fn default() -> Self {
        Self {
            keywords: KeywordRules::default(),
            max_depth: None,
            max_pages: None,
            max_concurrency: default_max_concurrency(),
            max_retry: default_max_retry(),
            time_range: None,
            url_patterns: None,
            parsing_pipeline: Vec::new(),
            request_params: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_builders() {
        let rule = ExtractionRule::xpath("//a").named("link").link().with_slice(0, -1);
        assert_eq!(rule.field_name(), Some("link"));
        assert_eq!(rule.selector_type(), SelectorType::Xpath);
        assert!(rule.is_link());
        assert_eq!(rule.slice(), Some((0, -1)));
        assert_eq!(ExtractionRule::css("p").field_key(), "");
    }

    #[test]
    fn test_rule_accepts_legacy_keys() {
        let yaml = "field_name: temperature\nrule: //td/text()\nrule_type: xpath\nslice_str: [0, -1]\n";
        let rule: ExtractionRule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.selector_expression(), "//td/text()");
        assert_eq!(rule.slice(), Some((0, -1)));
        assert!(!rule.is_link());
    }

    #[test]
    fn test_group_collects_repeated_names() {
        let grouped = ParseResult::group(vec![
            ParseResult::new("title", "a"),
            ParseResult::new("para", "1"),
            ParseResult::new("para", "2"),
            ParseResult::new("para", "3"),
        ]);
        assert_eq!(grouped["title"], ParseValue::from("a"));
        assert_eq!(
            grouped["para"],
            ParseValue::List(vec!["1".into(), "2".into(), "3".into()])
        );
    }

    #[test]
    fn test_record_serializes_as_object() {
        let mut fields = BTreeMap::new();
        fields.insert("city".to_string(), ParseResult::new("city", "Wuhan"));
        fields.insert("aqi".to_string(), ParseResult::new("aqi", "42"));
        let item = ParseResult::new("item", ParseValue::Record(fields));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["name"], "item");
        assert_eq!(json["value"]["city"], "Wuhan");
        assert_eq!(item.value.record_text("aqi"), Some("42"));
    }

    #[test]
    fn test_crawl_result_identity() {
        let root = CrawlResult::new("http://x.com/", "<html></html>", 0, None);
        let child = CrawlResult::new("http://x.com/a", "", 1, Some(root.id()));
        assert_eq!(root.id(), url_id("http://x.com/"));
        assert_eq!(child.neighbors(), &[root.id()]);
        assert!(root.neighbors().is_empty());
    }

    #[test]
    fn test_scrape_rules_defaults() {
        let rules: ScrapeRules = serde_yaml::from_str("max_depth: 2\n").unwrap();
        assert_eq!(rules.max_concurrency, 50);
        assert_eq!(rules.max_retry, 1);
        assert_eq!(rules.max_depth, Some(2));
        assert!(rules.parsing_pipeline.is_empty());
    }
}
