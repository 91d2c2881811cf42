//! Text, timestamp and URI helpers shared by the scrapers and the curation client.

use std::error::Error;
use std::fs as stdfs;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^```(?:json)?\s*|\s*```$").unwrap());

/// Collapse every whitespace run (including `&nbsp;`) to a single space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    let s = s.replace('\u{a0}', " ");
    WHITESPACE.replace_all(&s, " ").trim().to_string()
}

/// Strip the leading "By" boilerplate from an author line.
///
/// ```ignore
/// assert_eq!(strip_byline("By  JANE DOE"), "JANE DOE");
/// ```
pub fn strip_byline(s: &str) -> String {
    let s = collapse_whitespace(s);
    match s.strip_prefix("By ") {
        Some(rest) => rest.trim().to_string(),
        None if s == "By" => String::new(),
        None => s,
    }
}

/// Parse a Unix timestamp in milliseconds, as found in `data-timestamp`
/// style attributes. Returns `None` for anything unparsable.
pub fn parse_unix_millis(raw: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = raw.trim().parse().ok()?;
    DateTime::<Utc>::from_timestamp_millis(millis)
}

/// Resolve `href` against `base` and drop the fragment, so that two links
/// to the same page compare equal.
pub fn normalize_uri(base: &Url, href: &str) -> Result<Url, url::ParseError> {
    let mut uri = base.join(href.trim())?;
    uri.set_fragment(None);
    Ok(uri)
}

/// Remove markdown code fences a model sometimes wraps around JSON.
pub fn strip_code_fences(s: &str) -> String {
    CODE_FENCE.replace_all(s, "").trim().to_string()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (backing off to a char boundary)
/// with `"…(+N bytes)"` appended.
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

/// Detect if a serde_json error indicates truncated/incomplete JSON,
/// which for a model response usually means the token budget ran out.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Ensure a directory exists and is writable by creating and removing a
/// scratch file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    fs::create_dir_all(path).await?;
    let check_path = format!("{}/..__write_check__", path.trim_end_matches('/'));
    stdfs::File::create(&check_path)?;
    let _ = stdfs::remove_file(&check_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Storm\n\t hits   coast "), "Storm hits coast");
        assert_eq!(collapse_whitespace("a\u{a0}\u{a0}b"), "a b");
        assert_eq!(collapse_whitespace(" \n "), "");
    }

    #[test]
    fn test_strip_byline() {
        assert_eq!(strip_byline("By\u{a0}JANE DOE and JOHN ROE"), "JANE DOE and JOHN ROE");
        assert_eq!(strip_byline("  By   Sam Poe "), "Sam Poe");
        assert_eq!(strip_byline("Associated Press"), "Associated Press");
        assert_eq!(strip_byline("Byron Lake"), "Byron Lake");
        assert_eq!(strip_byline("By"), "");
    }

    #[test]
    fn test_parse_unix_millis() {
        let dt = parse_unix_millis("1717200000500").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-01T00:00:00.500+00:00");
        assert!(parse_unix_millis("yesterday").is_none());
        assert!(parse_unix_millis("").is_none());
    }

    #[test]
    fn test_normalize_uri_resolves_and_drops_fragment() {
        let base = Url::parse("https://apnews.com/").unwrap();
        let a = normalize_uri(&base, "/article/storm-abc#comments").unwrap();
        let b = normalize_uri(&base, "https://APNEWS.com/article/storm-abc").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "https://apnews.com/article/storm-abc");
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

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
    fn test_truncate_for_log_respects_char_boundary() {
        let s = "é".repeat(10);
        let result = truncate_for_log(&s, 3);
        assert!(result.starts_with('é'));
        assert!(result.contains("(+18 bytes)"));
    }

    #[test]
    fn test_looks_truncated() {
        let result: Result<serde_json::Value, _> = serde_json::from_str(r#"{"field": "value"#);
        assert!(looks_truncated(&result.unwrap_err()));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("out/json");
        ensure_writable_dir(nested.to_str().unwrap()).await.unwrap();
        assert!(nested.is_dir());
    }
}
