//! Date and time normalisation for scraped timestamps.
//!
//! News listings print publish times in many shapes: relative Chinese forms
//! such as `3小时前` or `昨天 13:15`, partial dates such as `6月5日`, and the
//! usual numeric formats. [`standardize_datetime`] turns all of them into a
//! [`NaiveDateTime`] relative to a given "now"; [`normalize_datetime_text`]
//! is the string-to-string form used as a datetime parser formatter.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Output format of [`normalize_datetime_text`].
pub const STANDARD_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static RELATIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,3})\s*(秒|分钟|小时|天)前").unwrap());
static DAY_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(今天|昨天|前天)\s*(?:(\d{1,2}):(\d{1,2}))?").unwrap());
static FULL_CN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日\s*(?:(\d{1,2}):(\d{1,2})(?::(\d{1,2}))?)?").unwrap()
});
static MONTH_DAY_CN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})\s*月\s*(\d{1,2})\s*日\s*(?:(\d{1,2}):(\d{1,2}))?").unwrap()
});
static NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})(?:[T\s]+(\d{1,2}):(\d{1,2})(?::(\d{1,2}))?)?").unwrap()
});

fn number(caps: &Captures<'_>, index: usize) -> Option<u32> {
    caps.get(index).and_then(|m| m.as_str().parse().ok())
}

fn at(date: NaiveDate, hour: Option<u32>, minute: Option<u32>, second: Option<u32>) -> Option<NaiveDateTime> {
    date.and_hms_opt(hour.unwrap_or(0), minute.unwrap_or(0), second.unwrap_or(0))
}

/// Interpret `text` as a point in time relative to `now`.
///
/// Understood forms, first match wins:
///
/// - `N秒前`, `N分钟前`, `N小时前`, `N天前`
/// - `今天 HH:MM`, `昨天 HH:MM`, `前天 HH:MM` (time optional)
/// - RFC 3339 (`2021-06-18T08:00:00+08:00`, wall-clock time kept)
/// - `YYYY年M月D日 [HH:MM[:SS]]`
/// - `YYYY-MM-DD [HH:MM[:SS]]`, also with `/` or `.` separators
/// - `M月D日 [HH:MM]` in the year of `now`
///
/// Returns `None` for empty or unrecognised text.
pub fn standardize_datetime(now: NaiveDateTime, text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = RELATIVE.captures(text) {
        let amount = i64::from(number(&caps, 1)?);
        let delta = match &caps[2] {
            "秒" => Duration::seconds(amount),
            "分钟" => Duration::minutes(amount),
            "小时" => Duration::hours(amount),
            _ => Duration::days(amount),
        };
        return now.checked_sub_signed(delta);
    }

    if let Some(caps) = DAY_WORD.captures(text) {
        let days_back = match &caps[1] {
            "今天" => 0,
            "昨天" => 1,
            _ => 2,
        };
        let date = now.date().checked_sub_signed(Duration::days(days_back))?;
        return at(date, number(&caps, 2), number(&caps, 3), None);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_local());
    }

    if let Some(caps) = FULL_CN.captures(text) {
        let year = i32::try_from(number(&caps, 1)?).ok()?;
        let date = NaiveDate::from_ymd_opt(year, number(&caps, 2)?, number(&caps, 3)?)?;
        return at(date, number(&caps, 4), number(&caps, 5), number(&caps, 6));
    }

    if let Some(caps) = NUMERIC.captures(text) {
        let year = i32::try_from(number(&caps, 1)?).ok()?;
        let date = NaiveDate::from_ymd_opt(year, number(&caps, 2)?, number(&caps, 3)?)?;
        return at(date, number(&caps, 4), number(&caps, 5), number(&caps, 6));
    }

    if let Some(caps) = MONTH_DAY_CN.captures(text) {
        let date = NaiveDate::from_ymd_opt(now.year(), number(&caps, 1)?, number(&caps, 2)?)?;
        return at(date, number(&caps, 3), number(&caps, 4), None);
    }

    None
}

/// Normalise `text` to [`STANDARD_FORMAT`] against the local clock, or return
/// it trimmed when it is not a recognised timestamp.
///
/// # Examples
///
/// ```ignore
/// let parser = ParsingStrategy::create(
///     ParserKind::Datetime,
///     ParserOptions::default().with_datetime_formatter(normalize_datetime_text),
/// )?;
/// ```
pub fn normalize_datetime_text(text: &str) -> String {
    let now = Local::now().naive_local();
    match standardize_datetime(now, text) {
        Some(parsed) => parsed.format(STANDARD_FORMAT).to_string(),
        None => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 6, 18)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    fn fmt(text: &str) -> Option<String> {
        standardize_datetime(now(), text).map(|dt| dt.format(STANDARD_FORMAT).to_string())
    }

    #[test]
    fn test_relative_forms() {
        assert_eq!(fmt("45秒前").as_deref(), Some("2021-06-18 10:29:15"));
        assert_eq!(fmt("58分钟前").as_deref(), Some("2021-06-18 09:32:00"));
        assert_eq!(fmt("1小时前").as_deref(), Some("2021-06-18 09:30:00"));
        assert_eq!(fmt("5天前").as_deref(), Some("2021-06-13 10:30:00"));
    }

    #[test]
    fn test_day_words() {
        assert_eq!(fmt("昨天13:15").as_deref(), Some("2021-06-17 13:15:00"));
        assert_eq!(fmt("昨天 08:05").as_deref(), Some("2021-06-17 08:05:00"));
        assert_eq!(fmt("前天").as_deref(), Some("2021-06-16 00:00:00"));
    }

    #[test]
    fn test_yesterday_crosses_month_boundary() {
        let first = NaiveDate::from_ymd_opt(2021, 7, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
        let parsed = standardize_datetime(first, "昨天 23:10").unwrap();
        assert_eq!(parsed.format(STANDARD_FORMAT).to_string(), "2021-06-30 23:10:00");
    }

    #[test]
    fn test_calendar_forms() {
        assert_eq!(fmt("6月5日").as_deref(), Some("2021-06-05 00:00:00"));
        assert_eq!(fmt("2020年12月31日 18:00").as_deref(), Some("2020-12-31 18:00:00"));
        assert_eq!(fmt("发布时间：2021-06-01 07:08").as_deref(), Some("2021-06-01 07:08:00"));
        assert_eq!(fmt("2021/6/1").as_deref(), Some("2021-06-01 00:00:00"));
        assert_eq!(fmt("2021-06-01T07:08:09+08:00").as_deref(), Some("2021-06-01 07:08:09"));
    }

    #[test]
    fn test_unrecognised() {
        assert_eq!(fmt(""), None);
        assert_eq!(fmt("刚刚"), None);
        assert_eq!(fmt("2021-13-40"), None);
        assert_eq!(normalize_datetime_text("  刚刚 "), "刚刚");
    }
}
