use crate::error::{EngineError, Result};
use crate::models::{ExtractionRule, ParseResult};
use crate::parsing::document::Document;
use crate::parsing::select_logged;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

/// Shape a string must have to be treated as a link: an optional scheme
/// followed by URL-safe characters.
pub const DEFAULT_LINK_PATTERN: &str =
    r"^(\b(https?|ftp|file)://)?[-A-Za-z0-9+&@#/%?=~_|!:,.;]+[-A-Za-z0-9+&@#/%=~_|]";

static DEFAULT_LINK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(DEFAULT_LINK_PATTERN).unwrap());

const WEB_SCHEMES: [&str; 4] = ["http", "https", "ftp", "file"];

/// Finds links in a page and resolves them to absolute URLs.
///
/// Each result is named after the link's visible text and carries the URL as
/// its value. Hrefs that do not start with `http` are joined onto the base
/// URL, resolved links with a non-web scheme (`javascript:`, `mailto:`) are
/// dropped, and duplicate `(text, url)` pairs are reported once in first-seen
/// order.
#[derive(Debug, Clone)]
pub struct LinkParser {
    link_pattern: Regex,
    base_url: Option<String>,
}

impl Default for LinkParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkParser {
    pub fn new() -> Self {
        Self::with_pattern(DEFAULT_LINK_REGEX.clone())
    }

    pub fn with_pattern(link_pattern: Regex) -> Self {
        Self {
            link_pattern,
            base_url: None,
        }
    }

    pub fn link_pattern(&self) -> &Regex {
        &self.link_pattern
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Replace the base URL used to resolve relative links.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidBaseUrl`] when `base_url` does not look like a
    /// link; the previous base URL is kept.
    pub fn set_base_url(&mut self, base_url: impl Into<String>) -> Result<()> {
        let base_url = base_url.into();
        if !self.link_pattern.is_match(&base_url) {
            return Err(EngineError::InvalidBaseUrl(base_url));
        }
        self.base_url = Some(base_url);
        Ok(())
    }

    pub fn parse(&self, document: &Document, rules: &[ExtractionRule]) -> Vec<ParseResult> {
        rules
            .iter()
            .filter_map(|rule| select_logged(document, rule))
            .flatten()
            .filter_map(|selection| {
                let href = selection.href()?;
                let href = href.trim();
                if !self.link_pattern.is_match(href) {
                    return None;
                }
                let url = self.resolve(href)?;
                Some(ParseResult::new(selection.text().trim(), url))
            })
            .unique()
            .collect()
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let resolved = match &self.base_url {
            Some(base) if !href.starts_with("http") => join_url(base, href),
            _ => href.to_string(),
        };
        match Url::parse(&resolved) {
            Ok(url) if !WEB_SCHEMES.contains(&url.scheme()) => {
                debug!(url = %resolved, "Dropping non-web link");
                None
            }
            _ => Some(resolved),
        }
    }
}

/// Join `href` onto `base` with browser semantics, falling back to the raw
/// href when either side cannot be parsed.
pub(crate) fn join_url(base: &str, href: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(href))
        .map(String::from)
        .unwrap_or_else(|_| href.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(base: &str) -> LinkParser {
        let mut parser = LinkParser::new();
        parser.set_base_url(base).unwrap();
        parser
    }

    #[test]
    fn test_relative_and_absolute_links() {
        let html = r#"<a href="../c">up</a><a href="http://y.com/z">abs</a>"#;
        let rules = [ExtractionRule::css("a").link()];
        let results = parser("http://x.com/a/b").parse(&Document::parse(html), &rules);
        assert_eq!(
            results,
            vec![ParseResult::new("up", "http://x.com/c"), ParseResult::new("abs", "http://y.com/z")]
        );
    }

    #[test]
    fn test_duplicates_and_non_web_links() {
        let html = r#"
            <h3><a href="/news/1.html"> First </a></h3>
            <h3><a href="/news/1.html">First</a></h3>
            <h3><a href="/news/1.html">Again</a></h3>
            <a href="javascript:void(0)">menu</a>
            <a href="mailto:desk@x.com">mail</a>
            <a>no href</a>"#;
        let rules = [ExtractionRule::xpath("//a")];
        let results = parser("https://x.com/list/").parse(&Document::parse(html), &rules);
        assert_eq!(
            results,
            vec![
                ParseResult::new("First", "https://x.com/news/1.html"),
                ParseResult::new("Again", "https://x.com/news/1.html"),
            ]
        );
    }

    #[test]
    fn test_without_base_url_links_are_kept_raw() {
        let html = r#"<a href="page/2">next</a>"#;
        let results = LinkParser::new().parse(&Document::parse(html), &[ExtractionRule::css("a")]);
        assert_eq!(results, vec![ParseResult::new("next", "page/2")]);
    }

    #[test]
    fn test_custom_pattern_filters_candidates() {
        let html = r#"<a href="/a.html">a</a><a href="/b.pdf">b</a>"#;
        let mut parser = LinkParser::with_pattern(Regex::new(r"(\.html$|^http)").unwrap());
        parser.set_base_url("http://x.com/").unwrap();
        let results = parser.parse(&Document::parse(html), &[ExtractionRule::css("a")]);
        assert_eq!(results, vec![ParseResult::new("a", "http://x.com/a.html")]);
    }

    #[test]
    fn test_invalid_base_url_keeps_previous() {
        let mut parser = parser("http://x.com/");
        let err = parser.set_base_url("").unwrap_err();
        assert!(matches!(err, EngineError::InvalidBaseUrl(ref url) if url.is_empty()));
        assert_eq!(parser.base_url(), Some("http://x.com/"));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://x.com/a/b", "../c"), "http://x.com/c");
        assert_eq!(join_url("not a base", "../c"), "../c");
    }
}
