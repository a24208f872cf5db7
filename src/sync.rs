//! Sync orchestration: refresh every novel's published record from the
//! remote site and drop submit locks the site has since confirmed.

use crate::config::SyncConfig;
use crate::console::Console;
use crate::error::{StoreError, SyncError};
use crate::model::{Document, PublishedRecord, split_lock_key};
use crate::release::ReleaseKey;
use crate::resolver::{ResolveInput, SeriesResolver};
use crate::scanner::CatalogScanner;
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Totals of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    /// Failed novels with the reason.
    pub failed: Vec<(String, String)>,
    pub locks_cleared: usize,
}

/// Effect of one scan on the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanApplied {
    pub locks_cleared: usize,
    pub pending_cleared: bool,
}

/// Replaces a novel's published record with a fresh scan and removes the
/// locks and pending marker it makes obsolete.
pub fn apply_scan(
    doc: &mut Document,
    slug: &str,
    remote_slug: &str,
    releases: BTreeSet<ReleaseKey>,
    now: DateTime<Utc>,
) -> ScanApplied {
    let stale: Vec<String> = doc
        .submit_locks
        .keys()
        .filter(|key| {
            split_lock_key(key)
                .is_some_and(|(lock_slug, release)| lock_slug == slug && releases.contains(&release))
        })
        .cloned()
        .collect();
    for key in &stale {
        doc.submit_locks.remove(key);
    }

    let pending_cleared = doc
        .pending_submission
        .as_ref()
        .is_some_and(|p| p.slug == slug && releases.contains(&p.release_key));
    if pending_cleared {
        doc.pending_submission = None;
    }

    doc.published_releases.insert(
        slug.to_string(),
        PublishedRecord {
            remote_slug: remote_slug.to_string(),
            last_scanned_at: now,
            releases,
        },
    );

    ScanApplied {
        locks_cleared: stale.len(),
        pending_cleared,
    }
}

/// Runs resolve → scan → record for each novel.
pub struct SyncOrchestrator {
    store: Arc<dyn Store>,
    resolver: SeriesResolver,
    scanner: CatalogScanner,
    inter_novel_delay: Duration,
    console: Console,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: SeriesResolver,
        scanner: CatalogScanner,
        config: &SyncConfig,
        console: Console,
    ) -> Self {
        Self {
            store,
            resolver,
            scanner,
            inter_novel_delay: Duration::from_millis(config.inter_novel_delay_ms),
            console,
        }
    }

    /// Syncs the novels in `scope`, or all of them.
    ///
    /// A failing novel is logged and counted; the rest still run. Only a
    /// failure to read the store aborts the batch.
    pub async fn sync(&self, scope: Option<&[String]>) -> Result<SyncReport, StoreError> {
        let doc = self.store.get().await?;
        let slugs: Vec<String> = doc
            .novels
            .keys()
            .filter(|slug| scope.is_none_or(|s| s.contains(slug)))
            .cloned()
            .collect();

        let mut report = SyncReport::default();
        if slugs.is_empty() {
            self.console.warning("No novels to sync");
            return Ok(report);
        }

        for (i, slug) in slugs.iter().enumerate() {
            if i > 0 && !self.inter_novel_delay.is_zero() {
                tokio::time::sleep(self.inter_novel_delay).await;
            }
            self.console
                .step(&format!("[{}/{}] {}", i + 1, slugs.len(), slug));

            match self.sync_novel(slug).await {
                Ok(applied) => {
                    report.synced += 1;
                    report.locks_cleared += applied.locks_cleared;
                }
                Err(err) => {
                    self.console.error(&format!("{}: {}", slug, err));
                    report.failed.push((slug.clone(), err.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Syncs one novel.
    pub async fn sync_novel(&self, slug: &str) -> Result<ScanApplied, SyncError> {
        let doc = self.store.get().await?;
        let novel = doc
            .novels
            .get(slug)
            .ok_or_else(|| SyncError::UnknownNovel(slug.to_string()))?;
        let config = doc.novel_configs.get(slug).cloned().unwrap_or_default();
        let previous = doc
            .published_releases
            .get(slug)
            .map(|record| record.remote_slug.as_str());

        let resolution = self
            .resolver
            .resolve(ResolveInput {
                slug_hint: config.remote_slug_hint.as_deref(),
                series_name: config.remote_series_name.as_deref(),
                novel_title: &novel.title,
                previous_slug: previous,
            })
            .await?;

        let releases = self
            .scanner
            .scan(&resolution.resolved_slug, &resolution.html)
            .await?;
        let found = releases.len();

        let mut doc = self.store.get().await?;
        let applied = apply_scan(&mut doc, slug, &resolution.resolved_slug, releases, Utc::now());
        self.store.set(doc).await?;

        self.console.success(&format!(
            "{} → {} ({}): {} published, {} locks cleared",
            slug, resolution.resolved_slug, resolution.source, found, applied.locks_cleared
        ));
        if applied.pending_cleared {
            self.console
                .info(&format!("{}: pending submission is now published", slug));
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RemoteConfig, ResolverConfig};
    use crate::model::{
        Chapter, LOCK_REASON_UNCONFIRMED, Novel, NovelConfig, PendingSubmission, SubmitLock,
        lock_key,
    };
    use crate::pending::build_pending;
    use crate::store::MemoryStore;
    use crate::testing::FakeRemote;

    fn novel(slug: &str, title: &str, chapters: u32) -> Novel {
        Novel {
            slug: slug.to_string(),
            title: title.to_string(),
            group: None,
            chapters: (1..=chapters)
                .map(|index| Chapter {
                    index,
                    unlocked: true,
                    url: format!("https://example.com/{}/{}", slug, index),
                    name: None,
                })
                .collect(),
            last_scanned_at: None,
        }
    }

    fn series_page(slug: &str, releases: &[u32]) -> String {
        let anchors: String = releases
            .iter()
            .map(|r| format!(r#"<a class="chp-release" title="c{0}">c{0}</a>"#, r))
            .collect();
        format!(
            r#"<html><head><link rel="canonical" href="https://www.novelupdates.com/series/{}/"></head>
            <body><table id="myTable">{}</table></body></html>"#,
            slug, anchors
        )
    }

    fn lock() -> SubmitLock {
        SubmitLock {
            reason: LOCK_REASON_UNCONFIRMED.to_string(),
            created_at: Utc::now(),
        }
    }

    fn orchestrator(doc: Document, remote: FakeRemote) -> (SyncOrchestrator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(doc));
        let remote = Arc::new(remote);
        let remote_config = RemoteConfig::default();
        let console = Console::quiet();

        let orchestrator = SyncOrchestrator::new(
            store.clone(),
            SeriesResolver::new(remote.clone(), &remote_config, &ResolverConfig::default(), console),
            CatalogScanner::new(remote, &remote_config, console),
            &SyncConfig {
                inter_novel_delay_ms: 0,
            },
            console,
        );
        (orchestrator, store)
    }

    #[tokio::test]
    async fn test_sync_clears_published_lock_and_marker() {
        let mut doc = Document::default();
        doc.upsert_novel(novel("x", "My Novel", 3));
        doc.novel_configs.insert(
            "x".to_string(),
            NovelConfig {
                remote_slug_hint: Some("my-novel".to_string()),
                ..NovelConfig::default()
            },
        );
        doc.submit_locks.insert(lock_key("x", ReleaseKey::new(2)), lock());
        doc.submit_locks.insert(lock_key("x", ReleaseKey::new(3)), lock());
        doc.pending_submission = Some(PendingSubmission {
            slug: "x".to_string(),
            release_key: ReleaseKey::new(2),
            display_text: "Chapter 2".to_string(),
            novel_title: "My Novel".to_string(),
            created_at: Utc::now(),
        });

        let remote = FakeRemote::new().page(
            &RemoteConfig::default().series_url("my-novel"),
            &series_page("my-novel", &[1, 2]),
        );
        let (orchestrator, store) = orchestrator(doc, remote);

        let report = orchestrator.sync(None).await.unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(report.locks_cleared, 1);
        assert!(report.failed.is_empty());

        let doc = store.get().await.unwrap();
        assert!(!doc.submit_locks.contains_key("x:c2"));
        assert!(doc.submit_locks.contains_key("x:c3"));
        assert!(doc.pending_submission.is_none());
        let record = &doc.published_releases["x"];
        assert_eq!(record.remote_slug, "my-novel");
        assert_eq!(record.releases, BTreeSet::from([ReleaseKey::new(1), ReleaseKey::new(2)]));

        let published = doc.published_for("x");
        let pending = build_pending(&doc, None, Utc::now(), chrono::Duration::days(7));
        assert!(pending.iter().all(|item| !published.contains(&item.release_key)));
    }

    #[tokio::test]
    async fn test_scan_replaces_record() {
        let mut doc = Document::default();
        doc.upsert_novel(novel("x", "My Novel", 2));
        doc.published_releases.insert(
            "x".to_string(),
            PublishedRecord {
                remote_slug: "my-novel".to_string(),
                last_scanned_at: Utc::now(),
                releases: BTreeSet::from([ReleaseKey::new(5)]),
            },
        );

        // No hint: the slug from the previous scan is reused.
        let remote = FakeRemote::new().page(
            &RemoteConfig::default().series_url("my-novel"),
            &series_page("my-novel", &[1]),
        );
        let (orchestrator, store) = orchestrator(doc, remote);

        orchestrator.sync(None).await.unwrap();

        let doc = store.get().await.unwrap();
        assert_eq!(doc.published_for("x"), BTreeSet::from([ReleaseKey::new(1)]));
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_batch() {
        let mut doc = Document::default();
        doc.upsert_novel(novel("a", "Lost Novel", 1));
        doc.upsert_novel(novel("b", "Found Novel", 1));

        let remote = FakeRemote::new().page(
            &RemoteConfig::default().series_url("found-novel"),
            &series_page("found-novel", &[1]),
        );
        let (orchestrator, store) = orchestrator(doc, remote);

        let report = orchestrator.sync(None).await.unwrap();

        assert_eq!(report.synced, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "a");
        assert!(report.failed[0].1.contains("Could not resolve series 'Lost Novel'"));

        let doc = store.get().await.unwrap();
        assert!(doc.is_published("b", ReleaseKey::new(1)));
        assert!(!doc.published_releases.contains_key("a"));
    }

    #[tokio::test]
    async fn test_scope_and_empty_catalog() {
        let (empty, _store) = orchestrator(Document::default(), FakeRemote::new());
        assert_eq!(empty.sync(None).await.unwrap(), SyncReport::default());

        let mut doc = Document::default();
        doc.upsert_novel(novel("a", "Lost Novel", 1));
        let (scoped, _store) = orchestrator(doc, FakeRemote::new());
        let scope = vec!["other".to_string()];
        assert_eq!(
            scoped.sync(Some(&scope)).await.unwrap(),
            SyncReport::default()
        );
    }

    #[test]
    fn test_apply_scan_leaves_other_novels() {
        let mut doc = Document::default();
        doc.submit_locks.insert(lock_key("y", ReleaseKey::new(1)), lock());
        doc.submit_locks.insert("malformed".to_string(), lock());

        let applied = apply_scan(
            &mut doc,
            "x",
            "remote-x",
            BTreeSet::from([ReleaseKey::new(1)]),
            Utc::now(),
        );

        assert_eq!(applied, ScanApplied::default());
        assert_eq!(doc.submit_locks.len(), 2);
        assert!(doc.is_published("x", ReleaseKey::new(1)));
    }
}
