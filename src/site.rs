//! Page recognition for the remote tracking site.
//!
//! Selectors come from [`RemoteConfig`] so a markup change on the site can
//! be absorbed by configuration. All functions here are synchronous and drop
//! the parsed document before returning.

use crate::config::RemoteConfig;
use crate::utils::normalize_key;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

static CANONICAL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"link[rel="canonical"], meta[property="og:url"]"#).unwrap()
});

static SCRIPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

/// `mypostid` assignment inside inline script, e.g. `var mypostid = 1234;`.
static POST_ID_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"mypostid["'\s]*[:=,]\s*["']?(\d+)"#).unwrap());

/// A search result from the remote catalog. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesCandidate {
    /// Title as shown in the results.
    pub display_text: String,
    /// Comparison key of `display_text`.
    pub normalized_key: String,
    /// Remote series slug.
    pub remote_id: String,
}

/// Compiled page markers of the remote site.
pub struct SitePages {
    series_path: String,
    not_found: Vec<Selector>,
    not_found_titles: Vec<String>,
    listing_markers: Vec<Selector>,
    post_id: Option<Selector>,
}

/// Parses configured selectors, skipping ones the CSS parser rejects.
fn parse_selectors(sources: &[String]) -> Vec<Selector> {
    sources
        .iter()
        .filter_map(|source| Selector::parse(source).ok())
        .collect()
}

impl SitePages {
    pub fn new(remote: &RemoteConfig) -> Self {
        Self {
            series_path: remote.series_path.clone(),
            not_found: parse_selectors(&remote.not_found_markers),
            not_found_titles: remote
                .not_found_titles
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
            listing_markers: parse_selectors(&remote.chapter_list_markers),
            post_id: Selector::parse(&remote.post_id_selector).ok(),
        }
    }

    /// Whether the page is the site's not-found page.
    pub fn is_not_found_page(&self, html: &str) -> bool {
        let doc = Html::parse_document(html);

        if self.not_found.iter().any(|s| doc.select(s).next().is_some()) {
            return true;
        }

        let title = doc
            .select(&TITLE)
            .next()
            .map(|t| t.text().collect::<String>().to_lowercase())
            .unwrap_or_default();

        self.not_found_titles.iter().any(|phrase| title.contains(phrase))
    }

    /// Whether the page looks like a series page: its canonical URL lies
    /// under the series path and it carries a chapter-listing marker.
    pub fn is_series_page(&self, html: &str) -> bool {
        let doc = Html::parse_document(html);

        let canonical_ok = doc.select(&CANONICAL).any(|el| {
            el.value()
                .attr("href")
                .or_else(|| el.value().attr("content"))
                .is_some_and(|url| series_slug_in(url, &self.series_path).is_some())
        });

        canonical_ok
            && self
                .listing_markers
                .iter()
                .any(|s| doc.select(s).next().is_some())
    }

    /// Post id used by the full chapter listing request.
    pub fn extract_post_id(&self, html: &str) -> Option<String> {
        let doc = Html::parse_document(html);

        if let Some(selector) = &self.post_id {
            let from_input = doc
                .select(selector)
                .filter_map(|el| el.value().attr("value"))
                .map(str::trim)
                .find(|value| !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()));
            if let Some(id) = from_input {
                return Some(id.to_string());
            }
        }

        doc.select(&SCRIPT).find_map(|script| {
            let text = script.text().collect::<String>();
            POST_ID_LITERAL
                .captures(&text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
    }

    /// Series links in a search response, in document order, one per slug.
    pub fn search_candidates(&self, html: &str) -> Vec<SeriesCandidate> {
        let doc = Html::parse_fragment(html);
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for anchor in doc.select(&ANCHOR) {
            let Some(slug) = anchor
                .value()
                .attr("href")
                .and_then(|href| series_slug_in(href, &self.series_path))
            else {
                continue;
            };

            let display_text = anchor
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if display_text.is_empty() || !seen.insert(slug.clone()) {
                continue;
            }

            candidates.push(SeriesCandidate {
                normalized_key: normalize_key(&display_text),
                display_text,
                remote_id: slug,
            });
        }

        candidates
    }
}

/// Slug following `series_path` in a URL or path, if any.
///
/// `https://site/series/my-novel/?tab=1` → `my-novel`.
pub fn series_slug_in(url: &str, series_path: &str) -> Option<String> {
    let marker = format!("/{}/", series_path.trim_matches('/'));
    let start = url.find(&marker)? + marker.len();
    let slug: String = url[start..]
        .chars()
        .take_while(|c| !matches!(c, '/' | '?' | '#'))
        .collect();

    (!slug.is_empty()).then_some(slug)
}
