//! Per-target outcome of one run.

use serde::Serialize;

/// Maximum characters of page text kept in [`ScanResult::sample`].
pub const SAMPLE_LIMIT: usize = 500;

/// Outcome of checking one target. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub name: String,
    pub url: String,
    pub hit: bool,
    /// Leading excerpt of the aggregated text, at most [`SAMPLE_LIMIT`] chars.
    pub sample: String,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl ScanResult {
    pub fn completed(name: &str, url: &str, hit: bool, text: &str, elapsed_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            hit,
            sample: truncate_chars(text, SAMPLE_LIMIT).to_string(),
            elapsed_ms,
            error: None,
        }
    }

    pub fn failed(name: &str, url: &str, error: impl ToString, elapsed_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            hit: false,
            sample: String::new(),
            elapsed_ms,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Prefix of `s` holding at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
