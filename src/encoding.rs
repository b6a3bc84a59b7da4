//! Character-encoding repair for fetched pages.
//!
//! Many Chinese sites still serve GBK or GB2312 without declaring it, and a
//! UTF-8 decode of those bodies yields mojibake. [`EncodingRepair`] decodes as
//! UTF-8 first, runs a plausibility check on the text and, when the check
//! fails, re-decodes the raw bytes with a list of fallback encodings.
//!
//! # Default check
//!
//! The default [`Plausibility::CjkRatio`] counts runs of consecutive
//! characters in the common CJK range (U+4E00..=U+9FA5) against runs in the
//! wider CJK block range (U+2E80..=U+FE4F). Mojibake scatters rare block
//! characters through the text and splits the runs apart, so a ratio below
//! 0.99 (or no CJK at all) marks the text as mis-decoded. Bodies that are
//! strictly valid UTF-8 and contain no CJK are accepted as they are.

use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

const COMMON_CJK: std::ops::RangeInclusive<char> = '\u{4E00}'..='\u{9FA5}';
const EXTENDED_CJK: std::ops::RangeInclusive<char> = '\u{2E80}'..='\u{FE4F}';

/// Decides whether decoded text looks like it was decoded correctly.
#[derive(Clone)]
pub enum Plausibility {
    /// Common-CJK to CJK-block run ratio must reach `threshold`.
    CjkRatio { threshold: f64 },
    /// Any text is accepted; disables repair.
    Always,
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Default for Plausibility {
    fn default() -> Self {
        Plausibility::CjkRatio { threshold: 0.99 }
    }
}

impl fmt::Debug for Plausibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plausibility::CjkRatio { threshold } => {
                f.debug_struct("CjkRatio").field("threshold", threshold).finish()
            }
            Plausibility::Always => f.write_str("Always"),
            Plausibility::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Plausibility {
    pub fn is_plausible(&self, text: &str) -> bool {
        match self {
            Plausibility::CjkRatio { threshold } => cjk_ratio(text).is_some_and(|r| r >= *threshold),
            Plausibility::Always => true,
            Plausibility::Custom(check) => check(text),
        }
    }
}

/// Ratio of common-CJK runs to CJK-block runs, `None` when the text holds no
/// CJK at all.
pub fn cjk_ratio(text: &str) -> Option<f64> {
    let (mut common, mut extended) = (0usize, 0usize);
    let (mut in_common, mut in_extended) = (false, false);
    for c in text.chars() {
        let is_common = COMMON_CJK.contains(&c);
        let is_extended = EXTENDED_CJK.contains(&c);
        if is_common && !in_common {
            common += 1;
        }
        if is_extended && !in_extended {
            extended += 1;
        }
        in_common = is_common;
        in_extended = is_extended;
    }
    (extended > 0).then(|| common as f64 / extended as f64)
}

/// UTF-8-first decoder with fallback encodings.
#[derive(Debug, Clone)]
pub struct EncodingRepair {
    check: Plausibility,
    fallbacks: Vec<&'static Encoding>,
}

impl Default for EncodingRepair {
    /// GBK, then GB2312, then UTF-8 with replacement characters.
    ///
    /// The WHATWG tables map the `gb2312` label onto the GBK decoder, so the
    /// second step decodes with GBK again; it is kept so the label list reads
    /// like the configuration existing scrapers were tuned against.
    fn default() -> Self {
        Self::with_labels(Plausibility::default(), &["gbk", "gb2312", "utf-8"])
    }
}

impl EncodingRepair {
    pub fn new(check: Plausibility, fallbacks: Vec<&'static Encoding>) -> Self {
        Self { check, fallbacks }
    }

    /// Build from encoding labels; unknown labels are skipped with a warning.
    pub fn with_labels(check: Plausibility, labels: &[&str]) -> Self {
        let fallbacks = labels
            .iter()
            .filter_map(|label| {
                let encoding = Encoding::for_label(label.as_bytes());
                if encoding.is_none() {
                    warn!(label, "Unknown encoding label ignored");
                }
                encoding
            })
            .collect();
        Self { check, fallbacks }
    }

    pub fn check(&self) -> &Plausibility {
        &self.check
    }

    /// Decode `bytes` into the most plausible text.
    ///
    /// Never fails: when no candidate passes the check the last attempted
    /// decode is returned.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let first = String::from_utf8_lossy(bytes);
        if self.check.is_plausible(&first) {
            return first.into_owned();
        }
        let clean_utf8 = matches!(first, Cow::Borrowed(_));
        if clean_utf8 && matches!(self.check, Plausibility::CjkRatio { .. }) && cjk_ratio(&first).is_none() {
            return first.into_owned();
        }

        let mut last: Cow<'_, str> = first;
        for encoding in &self.fallbacks {
            let (decoded, _, had_errors) = encoding.decode(bytes);
            if self.check.is_plausible(&decoded) {
                debug!(encoding = encoding.name(), had_errors, "Repaired page encoding");
                return decoded.into_owned();
            }
            last = decoded;
        }
        if self.fallbacks.is_empty() {
            return UTF_8.decode(bytes).0.into_owned();
        }
        last.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::GBK;

    #[test]
    fn test_cjk_ratio() {
        assert_eq!(cjk_ratio("hello"), None);
        assert_eq!(cjk_ratio("天气预报 weather"), Some(1.0));
        // U+3002 extends the run instead of opening a new one
        assert_eq!(cjk_ratio("天气。预报"), Some(2.0));
        assert_eq!(cjk_ratio("天 \u{3400}"), Some(0.5));
    }

    #[test]
    fn test_utf8_chinese_is_kept() {
        let repair = EncodingRepair::default();
        let text = "<p>武汉今日空气质量良好</p>";
        assert_eq!(repair.decode(text.as_bytes()), text);
    }

    #[test]
    fn test_gbk_body_is_repaired() {
        let text = "<title>湖北省天气预报</title>";
        let (bytes, _, _) = GBK.encode(text);
        let repair = EncodingRepair::default();
        assert_eq!(repair.decode(&bytes), text);
    }

    #[test]
    fn test_non_cjk_page_falls_through_to_utf8() {
        let text = "<p>Caf\u{e9} menu</p>";
        let repair = EncodingRepair::default();
        assert_eq!(repair.decode(text.as_bytes()), text);
    }

    #[test]
    fn test_custom_check() {
        let repair = EncodingRepair::new(
            Plausibility::Custom(Arc::new(|t: &str| t.contains("ok"))),
            vec![GBK],
        );
        assert_eq!(repair.decode(b"ok"), "ok");
        assert!(Plausibility::Always.is_plausible(""));
    }
}
