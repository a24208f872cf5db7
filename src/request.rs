//! Rate-limited, retrying HTTP layer for the remote tracking site.
//!
//! Every outbound request of the sync core goes through a [`RequestLayer`]:
//! it spaces requests by a minimum gap (the remote rate-limits per client),
//! retries throttling and gateway statuses honoring `Retry-After`, and
//! retries transport failures with linear backoff.

use crate::config::RequestConfig;
use crate::console::Console;
use crate::cookies::load_site_cookies;
use crate::error::RequestError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A request against the remote site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    Get { url: String },
    /// Form-encoded POST, as the site's AJAX endpoint expects.
    PostForm {
        url: String,
        form: Vec<(String, String)>,
    },
}

impl RemoteRequest {
    pub fn get(url: impl Into<String>) -> Self {
        RemoteRequest::Get { url: url.into() }
    }

    pub fn post_form(url: impl Into<String>, form: &[(&str, &str)]) -> Self {
        RemoteRequest::PostForm {
            url: url.into(),
            form: form
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            RemoteRequest::Get { url } | RemoteRequest::PostForm { url, .. } => url,
        }
    }

    /// Form value by name, for POST requests.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        match self {
            RemoteRequest::Get { .. } => None,
            RemoteRequest::PostForm { form, .. } => form
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
        }
    }
}

/// Per-call retry settings.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Name used in logs and errors.
    pub label: String,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub retry_statuses: Vec<u16>,
}

impl FetchOptions {
    pub fn from_config(config: &RequestConfig, label: &str) -> Self {
        Self {
            label: label.to_string(),
            max_attempts: config.max_attempts,
            retry_base: Duration::from_millis(config.retry_base_ms),
            retry_statuses: config.retry_statuses.clone(),
        }
    }
}

/// Text fetching as seen by the resolver and scanner.
#[async_trait]
pub trait RemoteFetch: Send + Sync {
    /// Fetches the body of `request`, retrying per the layer's defaults.
    async fn fetch_text(&self, request: RemoteRequest, label: &str)
    -> Result<String, RequestError>;
}

/// Delay before the next attempt.
///
/// A positive `Retry-After` wins; otherwise backoff grows linearly with the
/// attempt number (1-based).
pub fn retry_delay(attempt: u32, retry_after: Option<Duration>, base: Duration) -> Duration {
    match retry_after {
        Some(delay) if !delay.is_zero() => delay,
        _ => base * attempt.max(1),
    }
}

/// Parses a `Retry-After` value (delta-seconds or HTTP-date).
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<i64>() {
        return (seconds > 0).then(|| Duration::from_secs(seconds as u64));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    (at - now).to_std().ok().filter(|d| !d.is_zero())
}

/// Strips the stray `0` that the site's AJAX handler appends to its output.
pub fn trim_ajax_suffix(body: &str) -> &str {
    let trimmed = body.trim_end();
    match trimmed.strip_suffix('0') {
        Some(rest) if rest.is_empty() || rest.trim_end().ends_with('>') => rest.trim_end(),
        _ => body,
    }
}

/// Result of a single attempt that did not fail fatally.
enum Attempt {
    Done(String),
    Retry { reason: String, delay: Duration },
}

/// The rate-limited, retrying HTTP client.
pub struct RequestLayer {
    client: reqwest::Client,
    config: RequestConfig,
    min_interval: Duration,
    /// Start time reserved by the most recent request.
    last_request: Mutex<Option<Instant>>,
    console: Console,
}

impl RequestLayer {
    /// Creates the layer for `site`, loading session cookies if available.
    pub fn new(
        config: &RequestConfig,
        site: &Url,
        cookie_search_dir: Option<&Path>,
        console: Console,
    ) -> Result<Self, RequestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept-Language",
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.9"),
        );

        let jar = match load_site_cookies(site, config.cookie_file.as_deref(), cookie_search_dir) {
            Ok((jar, source, loaded)) => {
                if let Some(path) = source {
                    console.debug(
                        "request",
                        &format!("loaded {} cookies from {}", loaded, path.display()),
                    );
                }
                jar
            }
            Err(err) => {
                console.warning(&format!("Ignoring cookie file: {}", err));
                std::sync::Arc::new(reqwest::cookie::Jar::default())
            }
        };

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .cookie_provider(jar)
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            min_interval: Duration::from_millis(config.min_interval_ms),
            last_request: Mutex::new(None),
            console,
        })
    }

    /// Default retry settings for a labelled call.
    pub fn options(&self, label: &str) -> FetchOptions {
        FetchOptions::from_config(&self.config, label)
    }

    /// Fetches `request` and returns its body text.
    ///
    /// The minimum inter-request gap is enforced before every attempt.
    /// Non-retryable statuses fail immediately; exhausting attempts yields
    /// [`RequestError::Exhausted`].
    pub async fn fetch_text_with_retry(
        &self,
        request: &RemoteRequest,
        options: &FetchOptions,
    ) -> Result<String, RequestError> {
        let attempts = options.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            self.wait_for_slot().await;
            self.console.debug(
                "request",
                &format!(
                    "{} attempt {}/{}: {}",
                    options.label,
                    attempt,
                    attempts,
                    request.url()
                ),
            );

            match self.attempt(request, options, attempt).await? {
                Attempt::Done(body) => return Ok(body),
                Attempt::Retry { reason, delay } => {
                    if attempt < attempts {
                        self.console.warning(&format!(
                            "{}: {}, retrying in {:?} (attempt {}/{})",
                            options.label,
                            reason,
                            delay,
                            attempt + 1,
                            attempts
                        ));
                        tokio::time::sleep(delay).await;
                    }
                    last_reason = reason;
                }
            }
        }

        Err(RequestError::Exhausted {
            label: options.label.clone(),
            attempts,
            last: last_reason,
        })
    }

    async fn attempt(
        &self,
        request: &RemoteRequest,
        options: &FetchOptions,
        attempt: u32,
    ) -> Result<Attempt, RequestError> {
        let response = match self.build(request).send().await {
            Ok(response) => response,
            Err(err) => {
                return Ok(Attempt::Retry {
                    reason: format!("network error: {}", err),
                    delay: retry_delay(attempt, None, options.retry_base),
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(match response.text().await {
                Ok(body) => Attempt::Done(match request {
                    RemoteRequest::PostForm { .. } => trim_ajax_suffix(&body).to_string(),
                    RemoteRequest::Get { .. } => body,
                }),
                Err(err) => Attempt::Retry {
                    reason: format!("body read failed: {}", err),
                    delay: retry_delay(attempt, None, options.retry_base),
                },
            });
        }

        if options.retry_statuses.contains(&status.as_u16()) {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| parse_retry_after(value, Utc::now()));

            return Ok(Attempt::Retry {
                reason: format!("HTTP {}", status.as_u16()),
                delay: retry_delay(attempt, retry_after, options.retry_base),
            });
        }

        Err(RequestError::Status {
            label: options.label.clone(),
            url: request.url().to_string(),
            status: status.as_u16(),
        })
    }

    fn build(&self, request: &RemoteRequest) -> reqwest::RequestBuilder {
        match request {
            RemoteRequest::Get { url } => self.client.get(url),
            RemoteRequest::PostForm { url, form } => {
                let body = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(form.iter())
                    .finish();
                self.client
                    .post(url)
                    .header(
                        CONTENT_TYPE,
                        "application/x-www-form-urlencoded; charset=UTF-8",
                    )
                    .header("X-Requested-With", "XMLHttpRequest")
                    .body(body)
            }
        }
    }

    /// Reserves the next request slot and sleeps until it starts.
    async fn wait_for_slot(&self) {
        let wait = {
            let mut last = self
                .last_request
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = match *last {
                Some(previous) => (previous + self.min_interval).max(now),
                None => now,
            };
            *last = Some(slot);
            slot - now
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl RemoteFetch for RequestLayer {
    async fn fetch_text(
        &self,
        request: RemoteRequest,
        label: &str,
    ) -> Result<String, RequestError> {
        let options = self.options(label);
        self.fetch_text_with_retry(&request, &options).await
    }
}
