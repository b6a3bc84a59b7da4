use crate::models::ParseResult;
use crate::parsing::document::Document;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::collections::HashMap;

static TITLE_META: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:title"], meta[name="og:title"], meta[name="title"]"#).unwrap()
});
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static AUTHOR_META: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[name="author"], meta[property="article:author"], meta[name="byline"]"#).unwrap()
});
static DATE_META: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        r#"meta[property="article:published_time"], meta[name="pubdate"], meta[name="publishdate"], meta[itemprop="datePublished"], meta[name="PubDate"]"#,
    )
    .unwrap()
});
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time[datetime]").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

static AUTHOR_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:作者|记者|来源|责任编辑|[Aa]uthor)\s*[:：]\s*([^\s|<>,，]{1,30})").unwrap());
static DATE_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4}[-/年.]\d{1,2}[-/月.]\d{1,2}日?(?:\s*\d{1,2}:\d{1,2}(?::\d{1,2})?)?)").unwrap()
});

/// Whole-page extractor for article pages.
///
/// Ignores extraction rules and always yields `title`, `author`,
/// `publish_date` and `content`, in that order, each possibly empty. Metadata
/// tags win over page text; the body is the paragraph block with the most
/// text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewsParser;

impl NewsParser {
    pub fn parse(&self, document: &Document) -> Vec<ParseResult> {
        let text = document.text();
        vec![
            ParseResult::new("title", title(document)),
            ParseResult::new("author", author(document, &text)),
            ParseResult::new("publish_date", publish_date(document, &text)),
            ParseResult::new("content", content(document)),
        ]
    }
}

fn meta_content(document: &Document, selector: &Selector) -> Option<String> {
    document
        .html()
        .select(selector)
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string)
}

fn first_text(document: &Document, selector: &Selector) -> Option<String> {
    document
        .html()
        .select(selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty())
}

fn title(document: &Document) -> String {
    meta_content(document, &TITLE_META)
        .or_else(|| first_text(document, &TITLE))
        .or_else(|| first_text(document, &H1))
        .unwrap_or_default()
}

fn author(document: &Document, text: &str) -> String {
    meta_content(document, &AUTHOR_META)
        .or_else(|| {
            AUTHOR_TEXT
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
        .unwrap_or_default()
}

fn publish_date(document: &Document, text: &str) -> String {
    meta_content(document, &DATE_META)
        .or_else(|| {
            document
                .html()
                .select(&TIME)
                .filter_map(|el| el.value().attr("datetime"))
                .map(str::trim)
                .find(|dt| !dt.is_empty())
                .map(str::to_string)
        })
        .or_else(|| {
            DATE_TEXT
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
        .unwrap_or_default()
}

/// Paragraphs of the element whose direct `<p>` children hold the most text.
fn content(document: &Document) -> String {
    let mut blocks: HashMap<_, (ElementRef<'_>, Vec<String>, usize)> = HashMap::new();
    let mut order = Vec::new();
    for paragraph in document.html().select(&PARAGRAPH) {
        let Some(parent) = paragraph.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let text = paragraph.text().collect::<String>().trim().to_string();
        if text.is_empty() {
            continue;
        }
        let entry = blocks.entry(parent.id()).or_insert_with(|| {
            order.push(parent.id());
            (parent, Vec::new(), 0)
        });
        entry.2 += text.chars().count();
        entry.1.push(text);
    }

    // ties go to the block that appears first
    let mut best: Option<&(ElementRef<'_>, Vec<String>, usize)> = None;
    for id in &order {
        if let Some(block) = blocks.get(id) {
            if best.is_none_or(|b| block.2 > b.2) {
                best = Some(block);
            }
        }
    }
    best.map(|(_, paragraphs, _)| paragraphs.join("\n")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> Vec<ParseResult> {
        NewsParser.parse(&Document::parse(html))
    }

    #[test]
    fn test_metadata_article() {
        let html = r#"<html><head>
            <title>Site | Story</title>
            <meta property="og:title" content="Flood warning issued">
            <meta name="author" content="Li Wei">
            <meta property="article:published_time" content="2021-07-20T08:00:00+08:00">
            </head><body>
            <div class="nav"><p>Home</p></div>
            <div class="article"><p>Rain continued overnight.</p><p>Rivers are rising.</p></div>
            </body></html>"#;
        assert_eq!(
            parse(html),
            vec![
                ParseResult::new("title", "Flood warning issued"),
                ParseResult::new("author", "Li Wei"),
                ParseResult::new("publish_date", "2021-07-20T08:00:00+08:00"),
                ParseResult::new("content", "Rain continued overnight.\nRivers are rising."),
            ]
        );
    }

    #[test]
    fn test_falls_back_to_page_text() {
        let html = r#"<html><body>
            <h1>武汉发布暴雨预警</h1>
            <div class="info">2021年7月20日 08:30 来源：湖北日报</div>
            <div id="content"><p>今天凌晨开始降雨。</p><p>请市民注意出行安全。</p></div>
            </body></html>"#;
        let results = parse(html);
        assert_eq!(results[0], ParseResult::new("title", "武汉发布暴雨预警"));
        assert_eq!(results[1], ParseResult::new("author", "湖北日报"));
        assert_eq!(results[2], ParseResult::new("publish_date", "2021年7月20日 08:30"));
        assert_eq!(results[3], ParseResult::new("content", "今天凌晨开始降雨。\n请市民注意出行安全。"));
    }

    #[test]
    fn test_empty_page() {
        let names: Vec<String> = parse("").into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["title", "author", "publish_date", "content"]);
        assert!(parse("").iter().all(|r| r.value.is_empty()));
    }
}
