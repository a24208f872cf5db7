//! Release keys: the canonical unit of publication state.
//!
//! A chapter index maps to exactly one key (`c<N>`), and keys order by N.
//! Link text on the remote site is mapped back to keys by an ordered list
//! of patterns, most specific first.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Canonical release identifier, displayed as `c<N>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseKey(u32);

impl ReleaseKey {
    /// Creates the key for a chapter index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// The chapter index this key stands for.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Canonicalizes a chapter index into its release key.
pub fn to_release_key(index: u32) -> ReleaseKey {
    ReleaseKey::new(index)
}

impl fmt::Display for ReleaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Error returned when a string is not a `c<N>` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseReleaseKeyError(String);

impl fmt::Display for ParseReleaseKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a release key: '{}'", self.0)
    }
}

impl std::error::Error for ParseReleaseKeyError {}

impl FromStr for ReleaseKey {
    type Err = ParseReleaseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('c')
            .or_else(|| trimmed.strip_prefix('C'))
            .ok_or_else(|| ParseReleaseKeyError(s.to_string()))?;

        digits
            .parse::<u32>()
            .map(ReleaseKey)
            .map_err(|_| ParseReleaseKeyError(s.to_string()))
    }
}

impl Serialize for ReleaseKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReleaseKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Specific chapter markers, tried in order.
static SPECIFIC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // 第12章 / 第 12 话 / 第12回 / 第12話
        Regex::new(r"第\s*(\d+)\s*[章节節回话話]").unwrap(),
        // Chapter 12 / Chap. 12 / Ch 12
        Regex::new(r"(?i)\b(?:chapter|chap|ch)\.?\s*(\d+)").unwrap(),
        // Episode 12 / Ep. 12
        Regex::new(r"(?i)\b(?:episode|ep)\.?\s*(\d+)").unwrap(),
        // v2c12 / vol 2 c 12
        Regex::new(r"(?i)\bv(?:ol)?\.?\s*\d+\s*c\s*(\d+)\b").unwrap(),
        // c12 / c 12
        Regex::new(r"(?i)\bc\s*(\d+)\b").unwrap(),
    ]
});

/// Words that make a bare trailing number trustworthy.
static CONTEXT_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:chapter|release|ep)\b").unwrap());

/// Loose fallback: an integer at the end of the text.
static TRAILING_INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*$").unwrap());

/// Extracts a release key from link text.
///
/// Explicit chapter/episode markers win. A bare trailing number is only
/// accepted when a context word is present, so unrelated numbers in link
/// text (pagination, years, counts) do not turn into keys.
pub fn extract_release_key(text: &str) -> Option<ReleaseKey> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for pattern in SPECIFIC_PATTERNS.iter() {
        if let Some(index) = first_capture_as_index(pattern, text) {
            return Some(ReleaseKey(index));
        }
    }

    if CONTEXT_WORDS.is_match(text) {
        return first_capture_as_index(&TRAILING_INTEGER, text).map(ReleaseKey);
    }

    None
}

fn first_capture_as_index(pattern: &Regex, text: &str) -> Option<u32> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
}
