//! Data model shared by the sync core and the persisted document.
//!
//! Field names serialize in camelCase so the stored document stays
//! readable by the browser-side helpers that write novels and configs.

use crate::release::{ReleaseKey, to_release_key};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Current document schema version.
pub const DOCUMENT_VERSION: &str = "1.0.0";

/// Reason recorded on locks created from an unconfirmed submit.
pub const LOCK_REASON_UNCONFIRMED: &str = "unconfirmed-submit";

/// A chapter of a private-catalog novel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    /// Ordering key, unique per novel, not necessarily contiguous.
    pub index: u32,
    /// Whether the chapter is publicly readable.
    #[serde(default)]
    pub unlocked: bool,
    /// Public URL of the chapter.
    #[serde(default)]
    pub url: String,
    /// Display name from the scraper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Chapter {
    pub fn release_key(&self) -> ReleaseKey {
        to_release_key(self.index)
    }
}

/// A novel as produced by the scraper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Novel {
    /// Stable local identifier.
    pub slug: String,
    pub title: String,
    /// Group name shown on the private site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scanned_at: Option<DateTime<Utc>>,
}

impl Novel {
    /// Chapters ordered by index; a repeated index keeps its first entry.
    pub fn ordered_chapters(&self) -> Vec<&Chapter> {
        let mut by_index: BTreeMap<u32, &Chapter> = BTreeMap::new();
        for chapter in &self.chapters {
            by_index.entry(chapter.index).or_insert(chapter);
        }
        by_index.into_values().collect()
    }
}

/// How release text is written on the remote form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReleaseFormat {
    /// `Chapter 12`
    #[default]
    #[serde(rename = "chapter")]
    WordForm,
    /// `c12`
    #[serde(rename = "c")]
    LetterForm,
}

impl ReleaseFormat {
    /// Formats a chapter index as release text.
    pub fn format(self, index: u32) -> String {
        match self {
            ReleaseFormat::WordForm => format!("Chapter {}", index),
            ReleaseFormat::LetterForm => format!("c{}", index),
        }
    }
}

impl std::str::FromStr for ReleaseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chapter" | "word" => Ok(Self::WordForm),
            "c" | "letter" => Ok(Self::LetterForm),
            other => Err(format!("unknown release format '{}' (use chapter or c)", other)),
        }
    }
}

/// User-authored mapping from a novel to its remote series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NovelConfig {
    /// Remote slug or series URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_slug_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_series_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_group_name: Option<String>,
    #[serde(default)]
    pub release_format: ReleaseFormat,
}

/// The remote site's published releases for one novel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedRecord {
    pub remote_slug: String,
    pub last_scanned_at: DateTime<Utc>,
    #[serde(default)]
    pub releases: BTreeSet<ReleaseKey>,
}

/// The single submission the operator is currently filling in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubmission {
    pub slug: String,
    pub release_key: ReleaseKey,
    pub display_text: String,
    pub novel_title: String,
    pub created_at: DateTime<Utc>,
}

impl PendingSubmission {
    /// Marker for a worklist item.
    pub fn from_item(item: &PendingItem, now: DateTime<Utc>) -> Self {
        Self {
            slug: item.slug.clone(),
            release_key: item.release_key,
            display_text: item.release_text.clone(),
            novel_title: item.novel_title.clone(),
            created_at: now,
        }
    }
}

/// Suppresses a release from the worklist after an unconfirmed submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitLock {
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl SubmitLock {
    /// A lock is live until `created_at + ttl`.
    pub fn is_live(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now < self.created_at + ttl
    }
}

/// Key of a lock in the lock table.
pub fn lock_key(slug: &str, release_key: ReleaseKey) -> String {
    format!("{}:{}", slug, release_key)
}

/// Splits a lock table key back into slug and release key.
pub fn split_lock_key(key: &str) -> Option<(&str, ReleaseKey)> {
    let (slug, release) = key.rsplit_once(':')?;
    Some((slug, release.parse().ok()?))
}

/// One actionable row of the pending worklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingItem {
    pub slug: String,
    pub novel_title: String,
    pub chapter_index: u32,
    pub chapter_name: Option<String>,
    pub release_key: ReleaseKey,
    pub release_text: String,
    pub link: String,
    pub series_name: String,
    pub group_name: String,
}

/// Document bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Meta {
    pub version: String,
    pub last_updated: Option<DateTime<Utc>>,
    /// Novel slugs the operator scoped sync and listing to.
    pub selected_novels: Vec<String>,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            last_updated: None,
            selected_novels: Vec::new(),
        }
    }
}

/// The whole persisted state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub novels: BTreeMap<String, Novel>,
    pub novel_configs: BTreeMap<String, NovelConfig>,
    pub published_releases: BTreeMap<String, PublishedRecord>,
    pub pending_submission: Option<PendingSubmission>,
    pub submit_locks: BTreeMap<String, SubmitLock>,
    pub meta: Meta,
}

impl Document {
    /// Published keys for a novel, empty if never scanned.
    pub fn published_for(&self, slug: &str) -> BTreeSet<ReleaseKey> {
        self.published_releases
            .get(slug)
            .map(|record| record.releases.clone())
            .unwrap_or_default()
    }

    /// Whether a release is already published.
    pub fn is_published(&self, slug: &str, release_key: ReleaseKey) -> bool {
        self.published_releases
            .get(slug)
            .is_some_and(|record| record.releases.contains(&release_key))
    }

    /// Upserts a novel record.
    pub fn upsert_novel(&mut self, novel: Novel) {
        self.novels.insert(novel.slug.clone(), novel);
    }
}
