//! Series resolution: from a human-entered series name (and optional slug
//! hint) to a confirmed series page on the remote site.
//!
//! Strategies run in order and the first confirmed page wins:
//!
//! 1. the configured slug hint, then the slug found by the previous scan;
//! 2. the site search, once per keyword variant, scored by [`score_match`];
//! 3. a slug derived from the display name.
//!
//! Running out of request retries aborts resolution. A missing or
//! implausible page only moves on to the next strategy.

use crate::config::{RemoteConfig, ResolverConfig};
use crate::console::Console;
use crate::error::{RequestError, ResolveError};
use crate::request::{RemoteFetch, RemoteRequest};
use crate::site::{SeriesCandidate, SitePages, series_slug_in};
use crate::utils::{alphanumeric_only, normalize_key, normalize_title, slugify, tokens};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// What the resolver knows about a novel.
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    pub slug_hint: Option<&'a str>,
    pub series_name: Option<&'a str>,
    pub novel_title: &'a str,
    /// Remote slug recorded by the last successful scan.
    pub previous_slug: Option<&'a str>,
}

/// Which strategy produced a resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionSource {
    SlugHint,
    PreviousScan,
    Search { keyword: String, score: f64 },
    DerivedSlug,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionSource::SlugHint => write!(f, "slug hint"),
            ResolutionSource::PreviousScan => write!(f, "previous scan"),
            ResolutionSource::Search { keyword, score } => {
                write!(f, "search '{}' (score {:.2})", keyword, score)
            }
            ResolutionSource::DerivedSlug => write!(f, "derived slug"),
        }
    }
}

/// A confirmed series page.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub html: String,
    pub resolved_slug: String,
    pub source: ResolutionSource,
}

/// Reduces a slug hint (bare slug or any series URL) to the bare slug.
///
/// Scheme, host, query and fragment are dropped; the segment after
/// `series/` wins, else the last non-empty path segment.
pub fn normalize_slug_hint(hint: &str, series_path: &str) -> Option<String> {
    let hint = hint.trim();
    let without_scheme = hint.split_once("://").map_or(hint, |(_, rest)| rest);
    let path = if hint.contains("://") {
        without_scheme.find('/').map_or("", |i| &without_scheme[i..])
    } else {
        without_scheme
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();

    if let Some(slug) = series_slug_in(&format!("/{}", path.trim_start_matches('/')), series_path)
    {
        return Some(slug);
    }

    path.split('/')
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Search keywords for a display name, deduplicated in order.
pub fn keyword_variants(name: &str) -> Vec<String> {
    let raw = name.trim().to_string();
    let normalized = normalize_title(&raw);
    let compact = alphanumeric_only(&raw);
    let mut variants = vec![raw, normalized.clone(), compact];

    let words = tokens(&normalized);
    if words.len() >= 4 {
        variants.push(words[..words.len() - 1].join(" "));
        variants.push(words[..words.len() - 2].join(" "));
    }

    let mut seen = HashSet::new();
    variants.retain(|v| !v.is_empty() && seen.insert(v.clone()));
    variants
}

/// Similarity of a query and a candidate title.
///
/// Exact key match scores 3. Containment either way scores in (1, 2],
/// higher for closer lengths. Otherwise the token Jaccard ratio, plus 0.1
/// when the first tokens agree.
pub fn score_match(query: &str, candidate: &str) -> f64 {
    let query = normalize_key(query);
    let candidate = normalize_key(candidate);

    if query.is_empty() || candidate.is_empty() {
        return 0.0;
    }

    if query == candidate {
        return 3.0;
    }

    if query.contains(&candidate) || candidate.contains(&query) {
        let a = query.chars().count() as f64;
        let b = candidate.chars().count() as f64;
        return 2.0 - (a - b).abs() / a.max(b);
    }

    let query_tokens = tokens(&query);
    let candidate_tokens = tokens(&candidate);
    let query_set: HashSet<&str> = query_tokens.iter().copied().collect();
    let candidate_set: HashSet<&str> = candidate_tokens.iter().copied().collect();

    let union = query_set.union(&candidate_set).count();
    if union == 0 {
        return 0.0;
    }

    let overlap = query_set.intersection(&candidate_set).count() as f64 / union as f64;
    let first_agree = query_tokens.first() == candidate_tokens.first();
    overlap + if first_agree { 0.1 } else { 0.0 }
}

/// Best-scoring candidate for `query`; earlier candidates win ties.
pub fn best_candidate<'a>(
    query: &str,
    candidates: &'a [SeriesCandidate],
) -> Option<(&'a SeriesCandidate, f64)> {
    candidates
        .iter()
        .map(|c| (c, score_match(query, &c.display_text)))
        .fold(None, |best, (c, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((c, score)),
        })
}

/// Resolves novels to remote series pages.
pub struct SeriesResolver {
    fetch: Arc<dyn RemoteFetch>,
    remote: RemoteConfig,
    pages: SitePages,
    threshold: f64,
    console: Console,
}

impl SeriesResolver {
    pub fn new(
        fetch: Arc<dyn RemoteFetch>,
        remote: &RemoteConfig,
        resolver: &ResolverConfig,
        console: Console,
    ) -> Self {
        Self {
            fetch,
            remote: remote.clone(),
            pages: SitePages::new(remote),
            threshold: resolver.match_threshold,
            console,
        }
    }

    /// Runs the strategies in order until one yields a series page.
    pub async fn resolve(&self, input: ResolveInput<'_>) -> Result<Resolution, ResolveError> {
        let mut tried = Vec::new();

        let hint = input
            .slug_hint
            .and_then(|h| normalize_slug_hint(h, &self.remote.series_path));
        let previous = input
            .previous_slug
            .map(str::trim)
            .filter(|s| !s.is_empty() && Some(*s) != hint.as_deref())
            .map(str::to_string);

        for (slug, source) in [
            (hint, ResolutionSource::SlugHint),
            (previous, ResolutionSource::PreviousScan),
        ] {
            let Some(slug) = slug else { continue };
            if let Some(html) = self.try_series_page(&slug, &mut tried).await? {
                return Ok(self.resolved(html, slug, source));
            }
        }

        let name = input
            .series_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(input.novel_title);

        for keyword in keyword_variants(name) {
            let candidates = self.search(&keyword, &mut tried).await?;
            let Some((candidate, score)) = best_candidate(&keyword, &candidates) else {
                continue;
            };

            self.console.debug(
                "resolver",
                &format!(
                    "'{}' best candidate '{}' ({}) score {:.2}",
                    keyword, candidate.display_text, candidate.remote_id, score
                ),
            );
            if score < self.threshold {
                continue;
            }

            let slug = candidate.remote_id.clone();
            if let Some(html) = self.try_series_page(&slug, &mut tried).await? {
                return Ok(self.resolved(html, slug, ResolutionSource::Search { keyword, score }));
            }
        }

        let derived = slugify(name);
        if !derived.is_empty() && !tried.contains(&format!("slug:{}", derived)) {
            if let Some(html) = self.try_series_page(&derived, &mut tried).await? {
                return Ok(self.resolved(html, derived, ResolutionSource::DerivedSlug));
            }
        }

        Err(ResolveError::Unresolved {
            name: name.to_string(),
            tried,
        })
    }

    fn resolved(&self, html: String, slug: String, source: ResolutionSource) -> Resolution {
        self.console.debug("resolver", &format!("resolved {} via {}", slug, source));
        Resolution {
            html,
            resolved_slug: slug,
            source,
        }
    }

    /// Fetches a series page by slug, keeping it only if it is plausible.
    async fn try_series_page(
        &self,
        slug: &str,
        tried: &mut Vec<String>,
    ) -> Result<Option<String>, RequestError> {
        tried.push(format!("slug:{}", slug));
        let url = self.remote.series_url(slug);

        let html = match self.fetch.fetch_text(RemoteRequest::get(&url), "series page").await {
            Ok(html) => html,
            Err(err) if err.is_exhausted() => return Err(err),
            Err(err) => {
                self.console.debug("resolver", &format!("{} skipped: {}", slug, err));
                return Ok(None);
            }
        };

        if self.pages.is_not_found_page(&html) || !self.pages.is_series_page(&html) {
            self.console
                .debug("resolver", &format!("{} is not a series page", slug));
            return Ok(None);
        }

        Ok(Some(html))
    }

    /// Queries the site search; non-fatal failures yield no candidates.
    async fn search(
        &self,
        keyword: &str,
        tried: &mut Vec<String>,
    ) -> Result<Vec<SeriesCandidate>, RequestError> {
        tried.push(format!("search:{}", keyword));
        let request = RemoteRequest::post_form(
            self.remote.ajax_url(),
            &[
                ("action", self.remote.search_action.as_str()),
                ("strType", "desktop"),
                ("strOne", keyword),
                ("strSearchType", "series"),
            ],
        );

        match self.fetch.fetch_text(request, "series search").await {
            Ok(body) => Ok(self.pages.search_candidates(&body)),
            Err(err) if err.is_exhausted() => Err(err),
            Err(err) => {
                self.console
                    .debug("resolver", &format!("search '{}' failed: {}", keyword, err));
                Ok(Vec::new())
            }
        }
    }
}
