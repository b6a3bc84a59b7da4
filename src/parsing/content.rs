use crate::models::{ExtractionRule, ParseResult};
use crate::parsing::document::Document;
use crate::parsing::select_logged;

/// Extracts the text (or `href`, for link rules) of every element a rule
/// matches.
///
/// A rule yields one result per match with a non-empty value. A rule that
/// matches nothing, or whose matches are all empty, yields a single result
/// with an empty value so callers can tell "field missing" from "rule
/// broken" (a broken rule yields nothing).
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentParser;

impl ContentParser {
    pub fn parse(&self, document: &Document, rules: &[ExtractionRule]) -> Vec<ParseResult> {
        rules
            .iter()
            .flat_map(|rule| extract_values(document, rule, |value| value))
            .collect()
    }
}

/// Content extraction for one rule with `map` applied to each non-empty value.
pub(crate) fn extract_values(
    document: &Document,
    rule: &ExtractionRule,
    map: impl Fn(String) -> String,
) -> Vec<ParseResult> {
    let Some(selections) = select_logged(document, rule) else {
        return Vec::new();
    };
    let results: Vec<ParseResult> = selections
        .iter()
        .map(|selection| selection.value(rule.is_link()))
        .filter(|value| !value.is_empty())
        .map(|value| ParseResult::new(rule.field_key(), map(value)))
        .collect();
    if results.is_empty() {
        vec![ParseResult::empty(rule.field_key())]
    } else {
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str, rules: &[ExtractionRule]) -> Vec<ParseResult> {
        ContentParser.parse(&Document::parse(html), rules)
    }

    #[test]
    fn test_single_match() {
        let rules = [ExtractionRule::xpath("//div[contains(@class,'c-abstract')]").named("abstract")];
        let results = parse(r#"<div class="c-abstract">Hello</div>"#, &rules);
        assert_eq!(results, vec![ParseResult::new("abstract", "Hello")]);
    }

    #[test]
    fn test_every_match_and_missing_field() {
        let html = r#"
            <article>
              <h1> Title </h1>
              <p>one</p><p>  </p><p>two</p>
              <a href=" /next ">next</a>
            </article>"#;
        let rules = [
            ExtractionRule::css("h1").named("title"),
            ExtractionRule::css("p").named("para"),
            ExtractionRule::css("a").named("next").link(),
            ExtractionRule::css("footer").named("footer"),
        ];
        assert_eq!(
            parse(html, &rules),
            vec![
                ParseResult::new("title", "Title"),
                ParseResult::new("para", "one"),
                ParseResult::new("para", "two"),
                ParseResult::new("next", "/next"),
                ParseResult::empty("footer"),
            ]
        );
    }

    #[test]
    fn test_link_rule_without_href_is_empty() {
        let rules = [ExtractionRule::css("span").named("link").link()];
        assert_eq!(parse("<span>no link</span>", &rules), vec![ParseResult::empty("link")]);
    }
}
