//! Catalog scanning: the set of releases the remote site already lists for
//! a series.

use crate::config::RemoteConfig;
use crate::console::Console;
use crate::error::ScanError;
use crate::release::{ReleaseKey, extract_release_key};
use crate::request::{RemoteFetch, RemoteRequest};
use crate::site::SitePages;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// Release keys mentioned by any anchor's text, `title` or `data-title`.
pub fn extract_release_keys(html: &str) -> BTreeSet<ReleaseKey> {
    let doc = Html::parse_fragment(html);
    let mut keys = BTreeSet::new();

    for anchor in doc.select(&ANCHOR) {
        let text = anchor.text().collect::<String>();
        let candidates = [
            Some(text.as_str()),
            anchor.value().attr("title"),
            anchor.value().attr("data-title"),
        ];

        keys.extend(
            candidates
                .into_iter()
                .flatten()
                .filter_map(extract_release_key),
        );
    }

    keys
}

/// Reads published releases off series pages.
pub struct CatalogScanner {
    fetch: Arc<dyn RemoteFetch>,
    remote: RemoteConfig,
    pages: SitePages,
    console: Console,
}

impl CatalogScanner {
    pub fn new(fetch: Arc<dyn RemoteFetch>, remote: &RemoteConfig, console: Console) -> Self {
        Self {
            fetch,
            remote: remote.clone(),
            pages: SitePages::new(remote),
            console,
        }
    }

    /// Published release keys for the series page `html`.
    ///
    /// The series page only shows recent releases, so when it embeds a post
    /// id the full listing is fetched too. A failed listing fails the scan,
    /// since the result replaces the stored record wholesale.
    pub async fn scan(&self, slug: &str, html: &str) -> Result<BTreeSet<ReleaseKey>, ScanError> {
        let mut keys = extract_release_keys(html);
        let post_id = self.pages.extract_post_id(html);

        if let Some(post_id) = post_id {
            let request = RemoteRequest::post_form(
                self.remote.ajax_url(),
                &[
                    ("action", self.remote.chapter_list_action.as_str()),
                    ("mypostid", post_id.as_str()),
                    ("mygrr", "0"),
                ],
            );
            let listing = self.fetch.fetch_text(request, "chapter listing").await?;
            let from_listing = extract_release_keys(&listing);
            self.console.debug(
                "scanner",
                &format!(
                    "{}: {} keys on page, {} in full listing (post {})",
                    slug,
                    keys.len(),
                    from_listing.len(),
                    post_id
                ),
            );
            keys.extend(from_listing);
        }

        if keys.is_empty() {
            if self.pages.is_not_found_page(html) {
                return Err(ScanError::NotFound(slug.to_string()));
            }
            self.console.debug("scanner", &format!("{}: no releases yet", slug));
        }

        Ok(keys)
    }
}
