use crate::models::{ExtractionRule, ParseResult};
use crate::parsing::DatetimeFormatter;
use crate::parsing::content::extract_values;
use crate::parsing::document::Document;
use std::fmt;

/// Content extraction for date and time fields.
///
/// Pages rarely print timestamps in one format ("3小时前", "昨天 08:30",
/// "2021年6月18日"), so an optional formatter is applied to every extracted
/// value. [`crate::timefmt::normalize_datetime_text`] is the usual choice.
#[derive(Clone, Default)]
pub struct DatetimeParser {
    formatter: Option<DatetimeFormatter>,
}

impl fmt::Debug for DatetimeParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatetimeParser")
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}

impl DatetimeParser {
    pub fn new(formatter: Option<DatetimeFormatter>) -> Self {
        Self { formatter }
    }

    pub fn parse(&self, document: &Document, rules: &[ExtractionRule]) -> Vec<ParseResult> {
        rules
            .iter()
            .flat_map(|rule| {
                extract_values(document, rule, |value| match &self.formatter {
                    Some(format) => format(&value),
                    None => value,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const PAGE: &str = r#"<ul>
        <li><span class="time">2小时前</span></li>
        <li><span class="time">2021-06-18</span></li>
    </ul>"#;

    #[test]
    fn test_values_pass_through_formatter() {
        let parser = DatetimeParser::new(Some(Arc::new(|s: &str| format!("<{s}>"))));
        let rules = [ExtractionRule::css("span.time").named("date")];
        let results = parser.parse(&Document::parse(PAGE), &rules);
        assert_eq!(
            results,
            vec![ParseResult::new("date", "<2小时前>"), ParseResult::new("date", "<2021-06-18>")]
        );
    }

    #[test]
    fn test_without_formatter_and_empty_match() {
        let parser = DatetimeParser::default();
        let rules = [
            ExtractionRule::css("span.time").named("date"),
            ExtractionRule::css("time").named("published"),
        ];
        let results = parser.parse(&Document::parse(PAGE), &rules);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], ParseResult::new("date", "2小时前"));
        // the formatter never sees the placeholder for a missing field
        assert_eq!(results[2], ParseResult::empty("published"));
    }
}
