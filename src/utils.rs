//! Small helpers shared across the engine.
//!
//! - Stable URL ids for crawl results
//! - Python-style character slicing used by the list-item extractor
//! - String truncation for logging (safe on multi-byte text)
//! - File system validation for the CLI's output directory

use sha2::{Digest, Sha256};
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Stable 64-bit id for a URL.
///
/// Uses the first eight bytes of the URL's SHA-256 digest so ids are the same
/// across processes and builds.
pub fn url_id(url: &str) -> u64 {
    let digest = Sha256::digest(url.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Slice `text` by characters with Python's `text[start:end]` semantics.
///
/// Negative indices count from the end, out-of-range indices are clamped and
/// an empty string comes back when `start >= end` after normalisation.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(python_slice("12℃", 0, -1), "12");
/// assert_eq!(python_slice("abcdef", -3, 100), "def");
/// ```
pub fn python_slice(text: &str, start: i64, end: i64) -> String {
    let len = text.chars().count() as i64;
    let clamp = |index: i64| -> i64 {
        let index = if index < 0 { index + len } else { index };
        index.clamp(0, len)
    };
    let (start, end) = (clamp(start), clamp(end));
    if start >= end {
        return String::new();
    }
    text.chars()
        .skip(start as usize)
        .take((end - start) as usize)
        .collect()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to a character
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then writes and removes a probe
/// file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        // each character is three bytes; a cut at 4 must back off to 3
        let result = truncate_for_log("天气预报", 4);
        assert_eq!(result, "天…(+9 bytes)");
    }

    #[test]
    fn test_python_slice() {
        assert_eq!(python_slice("12℃", 0, -1), "12");
        assert_eq!(python_slice("abcdef", 1, 3), "bc");
        assert_eq!(python_slice("abcdef", -3, 100), "def");
        assert_eq!(python_slice("abcdef", -100, 2), "ab");
        assert_eq!(python_slice("abcdef", 4, 2), "");
        assert_eq!(python_slice("", 0, -1), "");
        assert_eq!(python_slice("最后更新：2021-06-18 08:00", 5, 15), "2021-06-18");
    }

    #[test]
    fn test_url_id_is_stable() {
        assert_eq!(url_id("http://x.com/a"), url_id("http://x.com/a"));
        assert_ne!(url_id("http://x.com/a"), url_id("http://x.com/b"));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out/2025-01-01");
        let path = nested.to_str().unwrap().to_string();
        ensure_writable_dir(&path).await.unwrap();
        assert!(nested.is_dir());
    }
}
