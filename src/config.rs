//! Configuration management for SynNovel.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "SynNovel";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Default store filename inside the config directory.
const STORE_FILENAME: &str = "synnovel-data.json";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Enable debug log lines.
    pub debug: bool,

    /// Remote tracking site layout.
    pub remote: RemoteConfig,

    /// Request layer settings.
    pub request: RequestConfig,

    /// Series resolution settings.
    pub resolver: ResolverConfig,

    /// Sync orchestration settings.
    pub sync: SyncConfig,

    /// Submission lifecycle settings.
    pub submission: SubmissionConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// Remote tracking site endpoints and page markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Site origin, without trailing slash.
    pub base_url: String,

    /// Path prefix of series pages.
    pub series_path: String,

    /// AJAX endpoint used for search and the full chapter listing.
    pub ajax_path: String,

    /// `action` value of the series search request.
    pub search_action: String,

    /// `action` value of the full chapter listing request.
    pub chapter_list_action: String,

    /// CSS selectors whose presence marks a not-found page.
    pub not_found_markers: Vec<String>,

    /// Phrases in the page title that mark a not-found page.
    pub not_found_titles: Vec<String>,

    /// CSS selectors of chapter-listing elements on a series page.
    pub chapter_list_markers: Vec<String>,

    /// CSS selector of the hidden input carrying the post id.
    pub post_id_selector: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.novelupdates.com".to_string(),
            series_path: "/series/".to_string(),
            ajax_path: "/wp-admin/admin-ajax.php".to_string(),
            search_action: "nd_ajaxsearchmain".to_string(),
            chapter_list_action: "nd_getchapters".to_string(),
            not_found_markers: vec!["body.error404".to_string(), ".page-404".to_string()],
            not_found_titles: vec!["page not found".to_string(), "nothing found".to_string()],
            chapter_list_markers: vec![
                "#myTable".to_string(),
                ".chp-release".to_string(),
                "#mypostid".to_string(),
                ".sp_chp".to_string(),
            ],
            post_id_selector: "input#mypostid".to_string(),
        }
    }
}

impl RemoteConfig {
    /// URL of a series page.
    pub fn series_url(&self, slug: &str) -> String {
        let prefix = self.series_path.trim_matches('/');
        format!(
            "{}/{}/{}/",
            self.base_url.trim_end_matches('/'),
            prefix,
            slug.trim_matches('/')
        )
    }

    /// URL of the AJAX endpoint.
    pub fn ajax_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.ajax_path.trim_start_matches('/')
        )
    }
}

/// Request layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Minimum gap between any two outbound requests, in milliseconds.
    pub min_interval_ms: u64,

    /// Attempts per request before giving up.
    pub max_attempts: u32,

    /// Linear backoff base, in milliseconds.
    pub retry_base_ms: u64,

    /// Statuses that are retried.
    pub retry_statuses: Vec<u16>,

    /// Per-request timeout in seconds.
    pub timeout_sec: u64,

    /// User agent sent with every request.
    pub user_agent: String,

    /// Netscape cookie file for the remote site.
    /// If not set, the config directory is searched for a file named after the site.
    pub cookie_file: Option<PathBuf>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1200,
            max_attempts: 3,
            retry_base_ms: 1500,
            retry_statuses: vec![429, 502, 503, 504],
            timeout_sec: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            cookie_file: None,
        }
    }
}

/// Series resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum score a search candidate needs to be accepted.
    pub match_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.45,
        }
    }
}

/// Sync orchestration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Pause between novels, in milliseconds.
    pub inter_novel_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            inter_novel_delay_ms: 1500,
        }
    }
}

/// Selectors of the remote add-release form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSelectors {
    pub series_input: Vec<String>,
    pub series_companion: String,
    pub release_input: Vec<String>,
    pub link_input: Vec<String>,
    pub group_input: Vec<String>,
    pub group_companion: String,
    pub dropdown_option: String,
}

impl Default for FormSelectors {
    fn default() -> Self {
        Self {
            series_input: vec!["input[name=\"series\"]".to_string(), "input#series".to_string()],
            series_companion: "input[name=\"series_id\"]".to_string(),
            release_input: vec!["input[name=\"release\"]".to_string(), "#release".to_string()],
            link_input: vec![
                "input[name=\"url\"]".to_string(),
                "input[name=\"link\"]".to_string(),
                "#link".to_string(),
            ],
            group_input: vec!["input[name=\"group\"]".to_string(), "input#group".to_string()],
            group_companion: "input[name=\"group_id\"]".to_string(),
            dropdown_option: ".dropdown-item, .select2-results__option".to_string(),
        }
    }
}

/// Submission lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Offsets from watch start at which the page is checked, in milliseconds.
    pub watch_schedule_ms: Vec<u64>,

    /// How long an unconfirmed submit suppresses its release.
    pub lock_ttl_days: i64,

    /// Wait schedule for dropdown options to appear, in milliseconds.
    pub dropdown_wait_ms: Vec<u64>,

    /// Selectors of page regions that carry submit feedback.
    pub success_regions: Vec<String>,

    /// Patterns indicating the release was accepted.
    pub success_patterns: Vec<String>,

    /// Patterns indicating the submit was rejected. Any match vetoes success.
    pub error_patterns: Vec<String>,

    /// Form field selectors.
    pub form: FormSelectors,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            watch_schedule_ms: vec![900, 2200, 4200],
            lock_ttl_days: 7,
            dropdown_wait_ms: vec![150, 400, 800, 1500, 2500, 4000, 5000],
            success_regions: vec![
                ".alert-success".to_string(),
                ".notice-success".to_string(),
                "#message".to_string(),
                ".wpb_alert".to_string(),
            ],
            success_patterns: vec![
                r"(?i)release\s+(has\s+been\s+)?(submitted|added)".to_string(),
                r"(?i)thank\s*you\s+for\s+(your\s+)?submi".to_string(),
                r"(?i)awaiting\s+(moderation|approval)".to_string(),
                r"(?i)successfully".to_string(),
            ],
            error_patterns: vec![
                r"(?i)duplicate|already\s+(exists|submitted)".to_string(),
                r"(?i)(is|are)\s+required|must\s+not\s+be\s+empty".to_string(),
                r"(?i)invalid".to_string(),
                r"(?i)too\s+many|rate\s*limit|slow\s+down".to_string(),
            ],
            form: FormSelectors::default(),
        }
    }
}

/// File path configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PathsConfig {
    /// JSON document holding novels, configs, published state and locks.
    pub store_file: Option<PathBuf>,
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.remote.base_url).is_err() {
            return Err(invalid("remote.base_url", "must be an absolute URL"));
        }

        if self.request.max_attempts == 0 {
            return Err(invalid("request.max_attempts", "must be greater than 0"));
        }

        let threshold = self.resolver.match_threshold;
        if !(threshold > 0.0 && threshold <= 3.0) {
            return Err(invalid("resolver.match_threshold", "must be in (0, 3]"));
        }

        if self.submission.watch_schedule_ms.is_empty() {
            return Err(invalid("submission.watch_schedule_ms", "must not be empty"));
        }

        if self.submission.lock_ttl_days <= 0 {
            return Err(invalid("submission.lock_ttl_days", "must be greater than 0"));
        }

        for (key, patterns) in [
            ("submission.success_patterns", &self.submission.success_patterns),
            ("submission.error_patterns", &self.submission.error_patterns),
        ] {
            for pattern in patterns {
                if let Err(e) = Regex::new(pattern) {
                    return Err(invalid(key, &e.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Returns the effective store file, using config or default.
    pub fn store_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.paths.store_file {
            Ok(path.clone())
        } else {
            Ok(Self::config_dir()?.join(STORE_FILENAME))
        }
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
