//! Utility functions for log formatting, model-response cleanup and body validation.

use once_cell::sync::Lazy;
use regex::Regex;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("static regex")
});

/// Truncate a string for logging purposes.
///
/// Long strings are cut at the last char boundary at or below `max` bytes
/// and get a `"…(+N bytes)"` suffix.
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

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````), if any.
pub fn strip_code_fence(s: &str) -> &str {
    match CODE_FENCE.captures(s).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => s.trim(),
    }
}

/// Slice from the first `[` through the first `]` that follows it.
///
/// Models tend to wrap a requested JSON array in prose; this keeps only the array.
pub fn json_array_slice(s: &str) -> Option<&str> {
    let start = s.find('[')?;
    let end = s[start..].find(']')? + start;
    Some(&s[start..=end])
}

/// Count non-blank, period-delimited segments.
pub fn sentence_count(body: &str) -> usize {
    body.split('.').filter(|s| !s.trim().is_empty()).count()
}

/// Bodies must be non-empty and have more than five sentences.
pub const MIN_SENTENCES_EXCLUSIVE: usize = 5;

pub fn is_substantial_body(body: &str) -> bool {
    !body.trim().is_empty() && sentence_count(body) > MIN_SENTENCES_EXCLUSIVE
}
