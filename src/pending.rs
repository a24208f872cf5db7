//! The pending worklist: unlocked chapters minus published releases minus
//! live submit locks.

use crate::model::{Document, PendingItem, lock_key};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Builds the pending worklist.
///
/// `scope` limits the novels considered; `None` means all. The result is
/// ordered by chapter index, then slug, and holds at most one item per
/// release key per novel.
pub fn build_pending(
    doc: &Document,
    scope: Option<&[String]>,
    now: DateTime<Utc>,
    lock_ttl: Duration,
) -> Vec<PendingItem> {
    let mut items = Vec::new();

    let novels = doc
        .novels
        .values()
        .filter(|novel| scope.is_none_or(|slugs| slugs.contains(&novel.slug)));

    for novel in novels {
        let config = doc.novel_configs.get(&novel.slug).cloned().unwrap_or_default();
        let published = doc.published_for(&novel.slug);
        let mut emitted = HashSet::new();

        let series_name = config
            .remote_series_name
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| novel.title.clone());
        let group_name = config
            .remote_group_name
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| novel.group.clone())
            .unwrap_or_default();

        for chapter in novel.ordered_chapters() {
            if !chapter.unlocked {
                continue;
            }

            let key = chapter.release_key();
            if published.contains(&key) {
                continue;
            }

            let locked = doc
                .submit_locks
                .get(&lock_key(&novel.slug, key))
                .is_some_and(|lock| lock.is_live(now, lock_ttl));
            if locked || !emitted.insert(key) {
                continue;
            }

            items.push(PendingItem {
                slug: novel.slug.clone(),
                novel_title: novel.title.clone(),
                chapter_index: chapter.index,
                chapter_name: chapter.name.clone(),
                release_key: key,
                release_text: config.release_format.format(chapter.index),
                link: chapter.url.clone(),
                series_name: series_name.clone(),
                group_name: group_name.clone(),
            });
        }
    }

    items.sort_by(|a, b| {
        a.chapter_index
            .cmp(&b.chapter_index)
            .then_with(|| a.slug.cmp(&b.slug))
    });
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Chapter, LOCK_REASON_UNCONFIRMED, Novel, NovelConfig, PublishedRecord, ReleaseFormat,
        SubmitLock,
    };
    use crate::release::ReleaseKey;

    fn novel(slug: &str, chapters: &[(u32, bool)]) -> Novel {
        Novel {
            slug: slug.to_string(),
            title: format!("{} title", slug),
            group: Some("Local Group".to_string()),
            chapters: chapters
                .iter()
                .map(|&(index, unlocked)| Chapter {
                    index,
                    unlocked,
                    url: format!("https://example.com/{}/{}", slug, index),
                    name: None,
                })
                .collect(),
            last_scanned_at: None,
        }
    }

    fn publish(doc: &mut Document, slug: &str, indices: &[u32]) {
        doc.published_releases.insert(
            slug.to_string(),
            PublishedRecord {
                remote_slug: slug.to_string(),
                last_scanned_at: Utc::now(),
                releases: indices.iter().copied().map(ReleaseKey::new).collect(),
            },
        );
    }

    fn ttl() -> Duration {
        Duration::days(7)
    }

    fn keys(items: &[PendingItem]) -> Vec<String> {
        items
            .iter()
            .map(|i| format!("{}:{}", i.slug, i.release_key))
            .collect()
    }

    #[test]
    fn test_locked_chapters_and_published_are_excluded() {
        let mut doc = Document::default();
        doc.upsert_novel(novel("x", &[(1, true), (2, true), (3, false)]));
        publish(&mut doc, "x", &[1]);

        let items = build_pending(&doc, None, Utc::now(), ttl());

        assert_eq!(keys(&items), vec!["x:c2"]);
        assert_eq!(items[0].release_text, "Chapter 2");
        assert_eq!(items[0].series_name, "x title");
        assert_eq!(items[0].group_name, "Local Group");
        assert_eq!(items[0].link, "https://example.com/x/2");
    }

    #[test]
    fn test_live_lock_suppresses_until_ttl() {
        let mut doc = Document::default();
        doc.upsert_novel(novel("x", &[(1, true), (2, true)]));
        let created = Utc::now();
        doc.submit_locks.insert(
            lock_key("x", ReleaseKey::new(2)),
            SubmitLock {
                reason: LOCK_REASON_UNCONFIRMED.to_string(),
                created_at: created,
            },
        );

        let during = build_pending(&doc, None, created + Duration::days(1), ttl());
        assert_eq!(keys(&during), vec!["x:c1"]);

        let after = build_pending(&doc, None, created + ttl() + Duration::milliseconds(1), ttl());
        assert_eq!(keys(&after), vec!["x:c1", "x:c2"]);
    }

    #[test]
    fn test_order_scope_and_config() {
        let mut doc = Document::default();
        doc.upsert_novel(novel("b", &[(2, true), (1, true)]));
        doc.upsert_novel(novel("a", &[(2, true)]));
        doc.upsert_novel(novel("c", &[(1, true)]));
        doc.novel_configs.insert(
            "a".to_string(),
            NovelConfig {
                remote_series_name: Some("Remote A".to_string()),
                remote_group_name: Some("Remote Group".to_string()),
                release_format: ReleaseFormat::LetterForm,
                ..NovelConfig::default()
            },
        );

        let all = build_pending(&doc, None, Utc::now(), ttl());
        assert_eq!(keys(&all), vec!["b:c1", "c:c1", "a:c2", "b:c2"]);

        let a = all.iter().find(|i| i.slug == "a").unwrap();
        assert_eq!(a.release_text, "c2");
        assert_eq!(a.series_name, "Remote A");
        assert_eq!(a.group_name, "Remote Group");

        let scope = vec!["a".to_string(), "c".to_string()];
        let scoped = build_pending(&doc, Some(&scope), Utc::now(), ttl());
        assert_eq!(keys(&scoped), vec!["c:c1", "a:c2"]);
    }

    #[test]
    fn test_blank_remote_names_fall_back() {
        let mut doc = Document::default();
        doc.upsert_novel(novel("x", &[(1, true)]));
        doc.novel_configs.insert(
            "x".to_string(),
            NovelConfig {
                remote_series_name: Some(" ".to_string()),
                remote_group_name: Some(String::new()),
                ..NovelConfig::default()
            },
        );

        let items = build_pending(&doc, None, Utc::now(), ttl());
        assert_eq!(items[0].series_name, "x title");
        assert_eq!(items[0].group_name, "Local Group");
    }

    #[test]
    fn test_duplicate_chapter_emitted_once() {
        let mut doc = Document::default();
        doc.upsert_novel(novel("x", &[(4, true), (4, true)]));

        assert_eq!(keys(&build_pending(&doc, None, Utc::now(), ttl())), vec!["x:c4"]);
    }

    #[test]
    fn test_builder_is_idempotent() {
        let mut doc = Document::default();
        doc.upsert_novel(novel("x", &[(1, true), (2, true), (5, true)]));
        doc.upsert_novel(novel("y", &[(1, true), (3, false)]));
        publish(&mut doc, "x", &[2]);
        let now = Utc::now();

        let first = build_pending(&doc, None, now, ttl());
        let second = build_pending(&doc, None, now, ttl());
        assert_eq!(first, second);
    }

    #[test]
    fn test_published_and_pending_disjoint() {
        let mut doc = Document::default();
        doc.upsert_novel(novel("x", &[(1, true), (2, true), (3, true)]));
        publish(&mut doc, "x", &[1, 3]);

        let published = doc.published_for("x");
        for item in build_pending(&doc, None, Utc::now(), ttl()) {
            assert!(!published.contains(&item.release_key));
        }
    }
}
