//! Parsed HTML document and rule-driven element selection.
//!
//! A [`Document`] is built once per page and every extractor queries it
//! through [`Document::select`], which dispatches on the rule's
//! [`SelectorType`]. Matches come back as [`Selection`]s so that XPath
//! expressions ending in `text()` or `@attr` and regex captures can be
//! handled the same way as element matches.

use crate::error::SelectorError;
use crate::models::{ExtractionRule, SelectorType};
use crate::parsing::xpath::XPath;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

/// One match of a selector.
#[derive(Debug, Clone)]
pub enum Selection<'a> {
    Element(ElementRef<'a>),
    /// A string result: text node, attribute value or regex capture.
    Text(String),
}

impl<'a> Selection<'a> {
    /// Concatenated descendant text, untrimmed.
    pub fn text(&self) -> String {
        match self {
            Selection::Element(element) => element.text().collect(),
            Selection::Text(text) => text.clone(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            Selection::Element(element) => element.value().attr(name),
            Selection::Text(_) => None,
        }
    }

    /// Link target of the match: the `href` attribute of an element, or the
    /// string itself for string results such as `//a/@href`.
    pub fn href(&self) -> Option<String> {
        match self {
            Selection::Element(element) => element.value().attr("href").map(str::to_string),
            Selection::Text(text) => Some(text.clone()),
        }
    }

    /// The value an extraction rule reads from this match, trimmed.
    pub fn value(&self, is_link: bool) -> String {
        if is_link {
            self.href().unwrap_or_default().trim().to_string()
        } else {
            self.text().trim().to_string()
        }
    }

    pub fn element(&self) -> Option<ElementRef<'a>> {
        match self {
            Selection::Element(element) => Some(*element),
            Selection::Text(_) => None,
        }
    }
}

pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(text: &str) -> Self {
        Self {
            html: Html::parse_document(text),
        }
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /// All text of the document, in document order.
    pub fn text(&self) -> String {
        self.html.root_element().text().collect()
    }

    pub fn select_rule(&self, rule: &ExtractionRule) -> Result<Vec<Selection<'_>>, SelectorError> {
        self.select(rule.selector_type(), rule.selector_expression())
    }

    /// Evaluate one selector expression.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] when the expression does not compile for its
    /// selector type. An expression that matches nothing is not an error.
    pub fn select(&self, selector_type: SelectorType, expression: &str) -> Result<Vec<Selection<'_>>, SelectorError> {
        match selector_type {
            SelectorType::Xpath => Ok(XPath::parse(expression)?.select(&self.html)),
            SelectorType::CssSelector => {
                let selector = Selector::parse(expression).map_err(|e| SelectorError::Css {
                    expression: expression.to_string(),
                    message: e.to_string(),
                })?;
                Ok(self.html.select(&selector).map(Selection::Element).collect())
            }
            SelectorType::Regex => {
                let re = Regex::new(expression).map_err(|e| SelectorError::Regex {
                    expression: expression.to_string(),
                    message: e.to_string(),
                })?;
                let text = self.text();
                Ok(re
                    .captures_iter(&text)
                    .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
                    .map(|m| Selection::Text(m.as_str().to_string()))
                    .collect())
            }
            SelectorType::ClassName => Ok(self
                .elements()
                .filter(|el| el.value().classes().any(|c| c == expression))
                .map(Selection::Element)
                .collect()),
            SelectorType::ElementId => Ok(self
                .elements()
                .find(|el| el.value().id() == Some(expression))
                .map(Selection::Element)
                .into_iter()
                .collect()),
            SelectorType::TextContent => {
                let mut seen = HashSet::new();
                Ok(self
                    .html
                    .root_element()
                    .descendants()
                    .filter(|node| node.value().as_text().is_some_and(|t| t.text.contains(expression)))
                    .filter_map(|node| node.parent().and_then(ElementRef::wrap))
                    .filter(|el| seen.insert(el.id()))
                    .map(Selection::Element)
                    .collect())
            }
        }
    }

    fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html.root_element().descendants().filter_map(ElementRef::wrap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Weather</title></head><body>
        <div id="main" class="box forecast">
          <p class="temp">12℃</p>
          <a href="/detail?id=3">detail</a>
          <span>更新时间：2021-06-18 08:00</span>
        </div>
        <div class="box"><p>空气质量 良</p></div>
    </body></html>"#;

    fn values(selector_type: SelectorType, expression: &str) -> Vec<String> {
        let doc = Document::parse(PAGE);
        doc.select(selector_type, expression)
            .unwrap()
            .iter()
            .map(|s| s.value(false))
            .collect()
    }

    #[test]
    fn test_css_and_class_name() {
        assert_eq!(values(SelectorType::CssSelector, "p.temp"), vec!["12℃"]);
        assert_eq!(values(SelectorType::ClassName, "box").len(), 2);
        assert!(values(SelectorType::ClassName, "bo").is_empty());
    }

    #[test]
    fn test_element_id_returns_first_match() {
        let doc = Document::parse(PAGE);
        let found = doc.select(SelectorType::ElementId, "main").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attr("class"), Some("box forecast"));
    }

    #[test]
    fn test_regex_uses_first_group() {
        assert_eq!(
            values(SelectorType::Regex, r"更新时间：(\d{4}-\d{2}-\d{2})"),
            vec!["2021-06-18"]
        );
        assert_eq!(values(SelectorType::Regex, r"\d+℃"), vec!["12℃"]);
    }

    #[test]
    fn test_text_content_returns_innermost_element() {
        let doc = Document::parse(PAGE);
        let found = doc.select(SelectorType::TextContent, "空气质量").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].element().unwrap().value().name(), "p");
    }

    #[test]
    fn test_link_value_reads_href() {
        let doc = Document::parse(PAGE);
        let found = doc.select(SelectorType::Xpath, "//div[@id='main']/a").unwrap();
        assert_eq!(found[0].value(true), "/detail?id=3");
        assert_eq!(found[0].value(false), "detail");
    }

    #[test]
    fn test_invalid_expressions() {
        let doc = Document::parse(PAGE);
        assert!(matches!(
            doc.select(SelectorType::CssSelector, "p[["),
            Err(SelectorError::Css { .. })
        ));
        assert!(matches!(doc.select(SelectorType::Regex, "("), Err(SelectorError::Regex { .. })));
        assert!(matches!(doc.select(SelectorType::Xpath, "//p["), Err(SelectorError::XPath { .. })));
    }
}
