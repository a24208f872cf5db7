//! Heuristic detection of submit feedback on the form page.

use crate::config::SubmissionConfig;
use regex::Regex;

/// What a page snapshot says about the last submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hint {
    Success,
    Error(String),
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct HintRule {
    pub kind: RuleKind,
    pub pattern: Regex,
}

/// Ordered success and error rules.
#[derive(Debug, Clone)]
pub struct HintClassifier {
    rules: Vec<HintRule>,
}

impl HintClassifier {
    pub fn new(rules: Vec<HintRule>) -> Self {
        Self { rules }
    }

    /// Error rules first, then success rules, as configured.
    pub fn from_config(config: &SubmissionConfig) -> Result<Self, regex::Error> {
        let mut rules = Vec::new();
        for pattern in &config.error_patterns {
            rules.push(HintRule {
                kind: RuleKind::Error,
                pattern: Regex::new(pattern)?,
            });
        }
        for pattern in &config.success_patterns {
            rules.push(HintRule {
                kind: RuleKind::Success,
                pattern: Regex::new(pattern)?,
            });
        }
        Ok(Self::new(rules))
    }

    /// Classifies a snapshot.
    ///
    /// Feedback regions are consulted first; the whole page text only when
    /// no region yields a hint. Any error match vetoes success.
    pub fn classify(&self, regions: &[String], page_text: &str) -> Hint {
        match self.classify_texts(regions.iter().map(String::as_str)) {
            Hint::Unknown => self.classify_texts(std::iter::once(page_text)),
            hint => hint,
        }
    }

    fn classify_texts<'a>(&self, texts: impl Iterator<Item = &'a str>) -> Hint {
        let mut success = false;

        for text in texts.filter(|t| !t.trim().is_empty()) {
            for rule in &self.rules {
                let Some(found) = rule.pattern.find(text) else {
                    continue;
                };
                match rule.kind {
                    RuleKind::Error => return Hint::Error(error_excerpt(text, found.start())),
                    RuleKind::Success => success = true,
                }
            }
        }

        if success { Hint::Success } else { Hint::Unknown }
    }
}

/// The line of `text` holding the match at `at`, trimmed.
fn error_excerpt(text: &str, at: usize) -> String {
    let start = text[..at].rfind('\n').map_or(0, |i| i + 1);
    let end = text[at..].find('\n').map_or(text.len(), |i| at + i);
    text[start..end].trim().to_string()
}
