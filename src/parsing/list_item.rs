use crate::models::{ExtractionRule, ParseResult, ParseValue};
use crate::parsing::document::Document;
use crate::parsing::select_logged;
use crate::utils::python_slice;
use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::warn;

/// Extracts a table-like list where every rule selects one column.
///
/// Columns are zipped row by row; when they have different lengths the
/// shorter ones are padded with empty cells. Each row comes back as a
/// `ParseResult` named `item` whose value is a record keyed by field name.
/// Rules sharing a field name (or all unnamed, keyed `""`) share one cell,
/// and the last such rule wins.
///
/// # Examples
///
/// ```ignore
/// let rules = [
///     ExtractionRule::xpath("//tr/td[1]").named("city"),
///     ExtractionRule::xpath("//tr/td[2]").named("aqi"),
/// ];
/// for row in ListItemParser.parse(&document, &rules) {
///     println!("{:?}", row.value.record_text("city"));
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ListItemParser;

impl ListItemParser {
    pub fn parse(&self, document: &Document, rules: &[ExtractionRule]) -> Vec<ParseResult> {
        for field in rules.iter().map(ExtractionRule::field_key).duplicates() {
            warn!(field, "Several list item rules share this field name; the last one wins");
        }

        let columns: Vec<Vec<String>> = rules
            .iter()
            .map(|rule| {
                let Some(selections) = select_logged(document, rule) else {
                    return Vec::new();
                };
                selections
                    .iter()
                    .map(|selection| {
                        let value = selection.value(rule.is_link());
                        match rule.slice() {
                            Some((start, end)) => python_slice(&value, start, end),
                            None => value,
                        }
                    })
                    .collect()
            })
            .collect();

        let rows = columns.iter().map(Vec::len).max().unwrap_or(0);
        (0..rows)
            .map(|row| {
                let record: BTreeMap<String, ParseResult> = rules
                    .iter()
                    .zip(&columns)
                    .map(|(rule, column)| {
                        let cell = match column.get(row) {
                            Some(value) => ParseResult::new(rule.field_key(), value.as_str()),
                            None => ParseResult::empty(rule.field_key()),
                        };
                        (rule.field_key().to_string(), cell)
                    })
                    .collect();
                ParseResult::new("item", ParseValue::Record(record))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"<table>
        <tr><td>武汉</td><td>12℃</td><td><a href="/wh">详情</a></td></tr>
        <tr><td>黄石</td><td>15℃</td><td><a href="/hs">详情</a></td></tr>
        <tr><td>十堰</td></tr>
    </table>"#;

    #[test]
    fn test_shorter_columns_are_padded() {
        let rules = [
            ExtractionRule::xpath("//tr/td[1]").named("city"),
            ExtractionRule::xpath("//tr/td[2]").named("temp").with_slice(0, -1),
        ];
        let rows = ListItemParser.parse(&Document::parse(TABLE), &rules);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.name == "item"));
        assert_eq!(rows[0].value.record_text("city"), Some("武汉"));
        assert_eq!(rows[0].value.record_text("temp"), Some("12"));
        assert_eq!(rows[2].value.record_text("city"), Some("十堰"));
        assert_eq!(rows[2].value.record_text("temp"), Some(""));
    }

    #[test]
    fn test_link_column_and_broken_rule() {
        let rules = [
            ExtractionRule::xpath("//tr/td[3]/a").named("detail").link(),
            ExtractionRule::xpath("//tr/td[").named("broken"),
        ];
        let rows = ListItemParser.parse(&Document::parse(TABLE), &rules);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value.record_text("detail"), Some("/hs"));
        assert_eq!(rows[1].value.record_text("broken"), Some(""));
    }

    #[test]
    fn test_shared_field_name_keeps_last_rule() {
        let rules = [
            ExtractionRule::xpath("//tr/td[1]").named("value"),
            ExtractionRule::xpath("//tr/td[2]").named("value"),
        ];
        let rows = ListItemParser.parse(&Document::parse(TABLE), &rules);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].value.record_text("value"), Some("12℃"));
        assert_eq!(rows[0].value.as_record().map(BTreeMap::len), Some(1));
        // the losing column still decides the row count
        assert_eq!(rows[2].value.record_text("value"), Some(""));
    }

    #[test]
    fn test_no_matches_gives_no_rows() {
        let rules = [ExtractionRule::css("li").named("entry")];
        assert!(ListItemParser.parse(&Document::parse(TABLE), &rules).is_empty());
    }
}
