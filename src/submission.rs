//! Submission lifecycle: pending marker, TTL submit locks, and the
//! fill → watch → reconcile flow on the remote add-release form.
//!
//! Remote success detection is heuristic. When a submit cannot be
//! confirmed either way, the release is locked out of the worklist for the
//! lock TTL instead of being offered again, so an unconfirmed submit is
//! never silently repeated.

use crate::classifier::{Hint, HintClassifier};
use crate::config::SubmissionConfig;
use crate::console::Console;
use crate::dom::{
    DropdownFields, PageAutomation, WaitOptions, fill_search_dropdown, offsets_to_delays,
};
use crate::error::SubmissionError;
use crate::model::{
    Document, LOCK_REASON_UNCONFIRMED, PendingItem, PendingSubmission, PublishedRecord,
    SubmitLock, lock_key,
};
use crate::pending::build_pending;
use crate::release::ReleaseKey;
use crate::store::Store;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a watch over a submit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The page reported success, or a scan published the release meanwhile.
    Confirmed,
    /// The page reported an error; the marker is kept for a retry.
    Unresolved { error: String },
    /// No feedback either way; the release is locked.
    Locked,
    /// A newer watch started.
    Superseded,
}

/// Records the release as published and drops its lock and marker.
fn mark_confirmed(doc: &mut Document, slug: &str, release_key: ReleaseKey, now: DateTime<Utc>) {
    doc.published_releases
        .entry(slug.to_string())
        .or_insert_with(|| PublishedRecord {
            remote_slug: String::new(),
            last_scanned_at: now,
            releases: Default::default(),
        })
        .releases
        .insert(release_key);

    doc.submit_locks.remove(&lock_key(slug, release_key));

    if doc
        .pending_submission
        .as_ref()
        .is_some_and(|p| p.slug == slug && p.release_key == release_key)
    {
        doc.pending_submission = None;
    }
}

/// Drives the add-release form and keeps the lifecycle state in the store.
pub struct SubmissionManager {
    store: Arc<dyn Store>,
    page: Arc<dyn PageAutomation>,
    classifier: HintClassifier,
    config: SubmissionConfig,
    ledger: SubmitLedger,
    /// Reconciliation tick; each watch takes a new one.
    tick: AtomicU64,
    console: Console,
}

impl SubmissionManager {
    pub fn new(
        store: Arc<dyn Store>,
        page: Arc<dyn PageAutomation>,
        config: &SubmissionConfig,
        console: Console,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            ledger: SubmitLedger::new(store.clone(), config),
            store,
            page,
            classifier: HintClassifier::from_config(config)?,
            config: config.clone(),
            tick: AtomicU64::new(0),
            console,
        })
    }

    /// Lock and marker maintenance over the same store.
    pub fn ledger(&self) -> &SubmitLedger {
        &self.ledger
    }

    pub fn lock_ttl(&self) -> Duration {
        self.ledger.lock_ttl()
    }

    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    /// Marks `item` as the pending submission and fills the form with it.
    ///
    /// Series and group go through the autocomplete dropdown, falling back
    /// to typing the plain value. Release text and link are required.
    pub async fn fill(&self, item: &PendingItem) -> Result<PendingSubmission, SubmissionError> {
        let mut doc = self.store.get().await?;
        if doc.is_published(&item.slug, item.release_key) {
            return Err(SubmissionError::AlreadyPublished {
                slug: item.slug.clone(),
                release_key: item.release_key.to_string(),
            });
        }

        let now = Utc::now();
        let key = lock_key(&item.slug, item.release_key);
        if doc
            .submit_locks
            .get(&key)
            .is_some_and(|lock| lock.is_live(now, self.lock_ttl()))
        {
            return Err(SubmissionError::Locked {
                slug: item.slug.clone(),
                release_key: item.release_key.to_string(),
            });
        }

        let marker = PendingSubmission::from_item(item, now);
        doc.pending_submission = Some(marker.clone());
        self.store.set(doc).await?;

        let form = &self.config.form;
        self.fill_dropdown(
            "series",
            &form.series_input,
            &form.series_companion,
            &item.series_name,
        )
        .await;

        if !self.fill_first(&form.release_input, &item.release_text).await {
            return Err(SubmissionError::FieldNotFilled("release".to_string()));
        }
        if !self.fill_first(&form.link_input, &item.link).await {
            return Err(SubmissionError::FieldNotFilled("link".to_string()));
        }

        if !item.group_name.is_empty() {
            self.fill_dropdown(
                "group",
                &form.group_input,
                &form.group_companion,
                &item.group_name,
            )
            .await;
        }

        self.console.success(&format!(
            "Filled {} {} ({})",
            item.novel_title, item.release_text, item.release_key
        ));
        Ok(marker)
    }

    /// Fills the first present input of `selectors`.
    async fn fill_first(&self, selectors: &[String], value: &str) -> bool {
        for selector in selectors {
            if self.page.fill_input(selector, value).await {
                return true;
            }
        }
        false
    }

    async fn fill_dropdown(&self, field: &str, inputs: &[String], companion: &str, value: &str) {
        let mut input = None;
        for selector in inputs {
            if self.page.exists(selector).await {
                input = Some(selector.as_str());
                break;
            }
        }

        if let Some(input) = input {
            let fields = DropdownFields {
                input,
                companion,
                option: &self.config.form.dropdown_option,
            };
            let wait = WaitOptions::from_millis(&self.config.dropdown_wait_ms);
            match fill_search_dropdown(self.page.as_ref(), fields, value, &wait).await {
                Ok(chosen) => {
                    self.console
                        .debug("submission", &format!("{} dropdown chose '{}'", field, chosen));
                    return;
                }
                Err(err) => self.console.warning(&format!(
                    "{} dropdown failed ({}), using plain input",
                    field, err
                )),
            }
        }

        if !self.fill_first(inputs, value).await {
            self.console
                .warning(&format!("Could not fill the {} field", field));
        }
    }

    /// Watches the page after a submit and reconciles the pending marker.
    ///
    /// The page is checked at each offset of the watch schedule. Success
    /// publishes the release; an error keeps the marker; silence locks the
    /// release. A watch started later supersedes this one.
    pub async fn watch(&self) -> Result<WatchOutcome, SubmissionError> {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst) + 1;

        let pending = self
            .store
            .get()
            .await?
            .pending_submission
            .ok_or(SubmissionError::NothingPending)?;

        let mut last_error = None;
        for delay in offsets_to_delays(&self.config.watch_schedule_ms) {
            tokio::time::sleep(delay).await;
            if self.current_tick() != tick {
                self.console.debug("submission", &format!("watch {} superseded", tick));
                return Ok(WatchOutcome::Superseded);
            }

            let regions = self.page.region_texts(&self.config.success_regions).await;
            let text = self.page.page_text().await;
            match self.classifier.classify(&regions, &text) {
                Hint::Success => {
                    let mut doc = self.store.get().await?;
                    mark_confirmed(&mut doc, &pending.slug, pending.release_key, Utc::now());
                    self.store.set(doc).await?;
                    self.console.success(&format!(
                        "Confirmed {} {}",
                        pending.novel_title, pending.display_text
                    ));
                    return Ok(WatchOutcome::Confirmed);
                }
                Hint::Error(message) => last_error = Some(message),
                Hint::Unknown => {}
            }
        }

        if let Some(error) = last_error {
            self.console.error(&format!(
                "Submit of {} {} failed: {}",
                pending.novel_title, pending.display_text, error
            ));
            return Ok(WatchOutcome::Unresolved { error });
        }

        let mut doc = self.store.get().await?;
        if doc.is_published(&pending.slug, pending.release_key) {
            if doc.pending_submission.as_ref() == Some(&pending) {
                doc.pending_submission = None;
                self.store.set(doc).await?;
            }
            self.console.info(&format!(
                "{} {} was published meanwhile",
                pending.novel_title, pending.display_text
            ));
            return Ok(WatchOutcome::Confirmed);
        }

        doc.submit_locks.insert(
            lock_key(&pending.slug, pending.release_key),
            SubmitLock {
                reason: LOCK_REASON_UNCONFIRMED.to_string(),
                created_at: Utc::now(),
            },
        );
        if doc.pending_submission.as_ref() == Some(&pending) {
            doc.pending_submission = None;
        }
        self.store.set(doc).await?;

        self.console.warning(&format!(
            "No confirmation for {} {}; locked for {} days",
            pending.novel_title, pending.display_text, self.config.lock_ttl_days
        ));
        Ok(WatchOutcome::Locked)
    }

    /// Restores the marker after a page reload by matching the form's link
    /// field against the worklist.
    pub async fn rederive_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingSubmission>, SubmissionError> {
        let mut link = None;
        for selector in &self.config.form.link_input {
            if let Some(value) = self.page.input_value(selector).await {
                let value = value.trim().to_string();
                if !value.is_empty() {
                    link = Some(value);
                    break;
                }
            }
        }
        let Some(link) = link else {
            return Ok(None);
        };

        let mut doc = self.store.get().await?;
        let Some(item) = build_pending(&doc, None, now, self.lock_ttl())
            .into_iter()
            .find(|item| item.link == link)
        else {
            return Ok(None);
        };

        let marker = PendingSubmission::from_item(&item, now);
        doc.pending_submission = Some(marker.clone());
        self.store.set(doc).await?;
        Ok(Some(marker))
    }
}

/// Lock table and pending marker maintenance.
///
/// Needs only the store, so it also serves callers without a form page.
pub struct SubmitLedger {
    store: Arc<dyn Store>,
    lock_ttl: Duration,
}

impl SubmitLedger {
    pub fn new(store: Arc<dyn Store>, config: &SubmissionConfig) -> Self {
        Self {
            store,
            lock_ttl: Duration::days(config.lock_ttl_days),
        }
    }

    pub fn lock_ttl(&self) -> Duration {
        self.lock_ttl
    }

    /// Manually confirms a release as published.
    pub async fn confirm(&self, slug: &str, release_key: ReleaseKey) -> Result<(), SubmissionError> {
        let mut doc = self.store.get().await?;
        mark_confirmed(&mut doc, slug, release_key, Utc::now());
        self.store.set(doc).await?;
        Ok(())
    }

    /// Removes one lock. Returns whether it existed.
    pub async fn clear_lock(
        &self,
        slug: &str,
        release_key: ReleaseKey,
    ) -> Result<bool, SubmissionError> {
        let mut doc = self.store.get().await?;
        if doc.submit_locks.remove(&lock_key(slug, release_key)).is_none() {
            return Ok(false);
        }
        self.store.set(doc).await?;
        Ok(true)
    }

    /// Locks still in force at `now`, by lock key.
    pub async fn live_locks(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, SubmitLock)>, SubmissionError> {
        let ttl = self.lock_ttl();
        Ok(self
            .store
            .get()
            .await?
            .submit_locks
            .into_iter()
            .filter(|(_, lock)| lock.is_live(now, ttl))
            .collect())
    }

    /// Deletes expired locks from the document. Returns how many went.
    pub async fn prune_expired_locks(&self, now: DateTime<Utc>) -> Result<usize, SubmissionError> {
        let ttl = self.lock_ttl();
        let mut doc = self.store.get().await?;
        let before = doc.submit_locks.len();
        doc.submit_locks.retain(|_, lock| lock.is_live(now, ttl));

        let pruned = before - doc.submit_locks.len();
        if pruned > 0 {
            self.store.set(doc).await?;
        }
        Ok(pruned)
    }

    /// Drops the pending marker, returning it.
    pub async fn cancel_pending(&self) -> Result<Option<PendingSubmission>, SubmissionError> {
        let mut doc = self.store.get().await?;
        let marker = doc.pending_submission.take();
        if marker.is_some() {
            self.store.set(doc).await?;
        }
        Ok(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Chapter, Novel};
    use crate::store::MemoryStore;
    use crate::testing::FakePage;

    const SERIES: &str = "input[name=\"series\"]";
    const SERIES_ID: &str = "input[name=\"series_id\"]";
    const RELEASE: &str = "input[name=\"release\"]";
    const LINK: &str = "input[name=\"url\"]";
    const GROUP: &str = "input[name=\"group\"]";

    fn fast_config() -> SubmissionConfig {
        SubmissionConfig {
            watch_schedule_ms: vec![5, 10, 15],
            dropdown_wait_ms: vec![1, 1],
            ..SubmissionConfig::default()
        }
    }

    fn document() -> Document {
        let mut doc = Document::default();
        doc.upsert_novel(Novel {
            slug: "x".to_string(),
            title: "My Novel".to_string(),
            group: Some("Group".to_string()),
            chapters: (1..=3)
                .map(|index| Chapter {
                    index,
                    unlocked: true,
                    url: format!("https://example.com/x/{}", index),
                    name: None,
                })
                .collect(),
            last_scanned_at: None,
        });
        doc
    }

    fn form_page() -> FakePage {
        FakePage::with_inputs(&[RELEASE, LINK, GROUP])
            .dropdown(SERIES, SERIES_ID, &["My Novel Side Story", "My Novel"])
    }

    fn manager(page: Arc<FakePage>, config: SubmissionConfig) -> (SubmissionManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(document()));
        let manager = SubmissionManager::new(store.clone(), page, &config, Console::quiet()).unwrap();
        (manager, store)
    }

    async fn first_item(store: &MemoryStore, release: u32) -> PendingItem {
        let doc = store.get().await.unwrap();
        build_pending(&doc, None, Utc::now(), Duration::days(7))
            .into_iter()
            .find(|i| i.chapter_index == release)
            .unwrap()
    }

    #[tokio::test]
    async fn test_fill_sets_marker_and_form() {
        let page = Arc::new(form_page());
        let (manager, store) = manager(page.clone(), fast_config());
        let item = first_item(&store, 2).await;

        let marker = manager.fill(&item).await.unwrap();

        assert_eq!(marker.release_key, ReleaseKey::new(2));
        assert_eq!(store.get().await.unwrap().pending_submission, Some(marker));
        assert_eq!(page.value(SERIES).as_deref(), Some("My Novel"));
        assert_eq!(page.value(SERIES_ID).as_deref(), Some("id-2"));
        assert_eq!(page.value(RELEASE).as_deref(), Some("Chapter 2"));
        assert_eq!(page.value(LINK).as_deref(), Some("https://example.com/x/2"));
        assert_eq!(page.value(GROUP).as_deref(), Some("Group"));
    }

    #[tokio::test]
    async fn test_fill_refuses_published() {
        let (manager, store) = manager(Arc::new(form_page()), fast_config());
        let item = first_item(&store, 1).await;
        store.add_published_release("x", ReleaseKey::new(1)).await.unwrap();

        let err = manager.fill(&item).await.unwrap_err();
        assert!(matches!(err, SubmissionError::AlreadyPublished { .. }));
        assert!(store.get().await.unwrap().pending_submission.is_none());
    }

    #[tokio::test]
    async fn test_fill_missing_link_keeps_marker() {
        let page = Arc::new(FakePage::with_inputs(&[SERIES, RELEASE]));
        let (manager, store) = manager(page, fast_config());
        let item = first_item(&store, 1).await;

        let err = manager.fill(&item).await.unwrap_err();
        assert!(matches!(err, SubmissionError::FieldNotFilled(ref f) if f == "link"));
        assert!(store.get().await.unwrap().pending_submission.is_some());
    }

    #[tokio::test]
    async fn test_watch_success_confirms() {
        let page = Arc::new(form_page());
        let (manager, store) = manager(page.clone(), fast_config());
        let item = first_item(&store, 2).await;
        manager.fill(&item).await.unwrap();
        page.set_region(".alert-success", "Release has been submitted");

        assert_eq!(manager.watch().await.unwrap(), WatchOutcome::Confirmed);

        let doc = store.get().await.unwrap();
        assert!(doc.is_published("x", ReleaseKey::new(2)));
        assert!(doc.pending_submission.is_none());
        assert!(doc.submit_locks.is_empty());
    }

    #[tokio::test]
    async fn test_watch_without_hints_locks() {
        let page = Arc::new(form_page());
        let (manager, store) = manager(page, fast_config());
        let item = first_item(&store, 2).await;
        manager.fill(&item).await.unwrap();

        assert_eq!(manager.watch().await.unwrap(), WatchOutcome::Locked);

        let doc = store.get().await.unwrap();
        assert!(doc.pending_submission.is_none());
        let lock = &doc.submit_locks["x:c2"];
        assert_eq!(lock.reason, LOCK_REASON_UNCONFIRMED);

        let pending = build_pending(&doc, None, Utc::now(), manager.lock_ttl());
        assert!(pending.iter().all(|i| i.release_key != ReleaseKey::new(2)));
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn test_fill_refuses_live_lock() {
        let (manager, store) = manager(Arc::new(form_page()), fast_config());
        let item = first_item(&store, 2).await;
        manager.fill(&item).await.unwrap();
        assert_eq!(manager.watch().await.unwrap(), WatchOutcome::Locked);

        let err = manager.fill(&item).await.unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::Locked { ref release_key, .. } if release_key == "c2"
        ));
        assert!(store.get().await.unwrap().pending_submission.is_none());

        assert!(manager.ledger().clear_lock("x", ReleaseKey::new(2)).await.unwrap());
        assert!(manager.fill(&item).await.is_ok());
    }

    #[tokio::test]
    async fn test_watch_skips_lock_when_published_meanwhile() {
        let (manager, store) = manager(Arc::new(form_page()), fast_config());
        manager.fill(&first_item(&store, 2).await).await.unwrap();
        store.add_published_release("x", ReleaseKey::new(2)).await.unwrap();

        assert_eq!(manager.watch().await.unwrap(), WatchOutcome::Confirmed);

        let doc = store.get().await.unwrap();
        assert!(doc.is_published("x", ReleaseKey::new(2)));
        assert!(doc.submit_locks.is_empty());
        assert!(doc.pending_submission.is_none());
    }

    #[tokio::test]
    async fn test_watch_error_keeps_marker() {
        let page = Arc::new(form_page());
        let (manager, store) = manager(page.clone(), fast_config());
        manager.fill(&first_item(&store, 1).await).await.unwrap();
        page.set_page_text("Error: this release already exists.");

        let outcome = manager.watch().await.unwrap();
        assert_eq!(
            outcome,
            WatchOutcome::Unresolved {
                error: "Error: this release already exists.".to_string()
            }
        );

        let doc = store.get().await.unwrap();
        assert!(doc.pending_submission.is_some());
        assert!(doc.submit_locks.is_empty());
    }

    #[tokio::test]
    async fn test_newer_watch_supersedes() {
        let config = SubmissionConfig {
            watch_schedule_ms: vec![60, 80],
            ..fast_config()
        };
        let (manager, store) = manager(Arc::new(form_page()), config);
        manager.fill(&first_item(&store, 1).await).await.unwrap();

        let (older, newer) = tokio::join!(manager.watch(), async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            manager.watch().await
        });

        assert_eq!(older.unwrap(), WatchOutcome::Superseded);
        assert_eq!(newer.unwrap(), WatchOutcome::Locked);
        assert_eq!(manager.current_tick(), 2);
    }

    #[tokio::test]
    async fn test_watch_without_marker() {
        let (manager, _store) = manager(Arc::new(form_page()), fast_config());
        assert!(matches!(
            manager.watch().await,
            Err(SubmissionError::NothingPending)
        ));
    }

    #[tokio::test]
    async fn test_rederive_from_link_field() {
        let page = Arc::new(form_page());
        let (manager, store) = manager(page.clone(), fast_config());

        assert_eq!(manager.rederive_pending(Utc::now()).await.unwrap(), None);

        page.set_value(LINK, "https://example.com/x/3");
        let marker = manager.rederive_pending(Utc::now()).await.unwrap().unwrap();
        assert_eq!(marker.release_key, ReleaseKey::new(3));
        assert_eq!(store.get().await.unwrap().pending_submission, Some(marker));
    }

    #[tokio::test]
    async fn test_lock_maintenance() {
        let (manager, store) = manager(Arc::new(form_page()), fast_config());
        let now = Utc::now();
        let mut doc = store.get().await.unwrap();
        for (key, age) in [("x:c1", 1), ("x:c2", 8)] {
            doc.submit_locks.insert(
                key.to_string(),
                SubmitLock {
                    reason: LOCK_REASON_UNCONFIRMED.to_string(),
                    created_at: now - Duration::days(age),
                },
            );
        }
        store.set(doc).await.unwrap();

        let live = manager.ledger().live_locks(now).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].0, "x:c1");

        assert_eq!(manager.ledger().prune_expired_locks(now).await.unwrap(), 1);
        assert_eq!(store.get().await.unwrap().submit_locks.len(), 1);

        assert!(manager.ledger().clear_lock("x", ReleaseKey::new(1)).await.unwrap());
        assert!(!manager.ledger().clear_lock("x", ReleaseKey::new(1)).await.unwrap());
        assert!(store.get().await.unwrap().submit_locks.is_empty());
    }

    #[tokio::test]
    async fn test_confirm_and_cancel() {
        let (manager, store) = manager(Arc::new(form_page()), fast_config());
        manager.fill(&first_item(&store, 3).await).await.unwrap();

        let cancelled = manager.ledger().cancel_pending().await.unwrap().unwrap();
        assert_eq!(cancelled.release_key, ReleaseKey::new(3));
        assert!(manager.ledger().cancel_pending().await.unwrap().is_none());

        manager.ledger().confirm("x", ReleaseKey::new(3)).await.unwrap();
        assert!(store.get().await.unwrap().is_published("x", ReleaseKey::new(3)));
    }
}
