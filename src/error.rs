//! Error types for SynNovel.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use thiserror::Error;

/// Errors surfaced by the request layer.
#[derive(Error, Debug)]
pub enum RequestError {
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// The server answered with a status that is not retried.
    #[error("{label}: HTTP {status} for {url}")]
    Status {
        label: String,
        url: String,
        status: u16,
    },

    /// All attempts were used up on retryable failures.
    #[error("{label}: all {attempts} attempts failed ({last})")]
    Exhausted {
        label: String,
        attempts: u32,
        last: String,
    },
}

impl RequestError {
    /// Returns true if the server explicitly reported the page as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RequestError::Status { status: 404, .. })
    }

    /// Returns true if retries were exhausted.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RequestError::Exhausted { .. })
    }
}

/// Errors from series resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No strategy produced a confirmed series page.
    #[error("Could not resolve series '{name}' (tried: {})", .tried.join(", "))]
    Unresolved { name: String, tried: Vec<String> },

    /// The remote service kept failing.
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Errors from a catalog scan.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The resolved page turned out to be a not-found page.
    #[error("Series page not found: {0}")]
    NotFound(String),

    /// Fetching the full chapter listing failed.
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Errors from the persisted document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to read or write the store file.
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to (de)serialize the document.
    #[error("Store serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A key path could not be applied to the document.
    #[error("Invalid store path '{0}'")]
    InvalidPath(String),
}

/// Errors from the page automation adapter.
#[derive(Error, Debug)]
pub enum DomError {
    /// An element did not appear before the wait schedule ran out.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// No dropdown option matched the requested text.
    #[error("Dropdown option not found: {0}")]
    OptionNotFound(String),

    /// The dropdown's hidden companion field stayed empty after selection.
    #[error("Dropdown selection was not confirmed for {0}")]
    NotConfirmed(String),
}

/// Errors from the submission lifecycle.
#[derive(Error, Debug)]
pub enum SubmissionError {
    /// The release is already in the published set.
    #[error("{slug} {release_key} is already published")]
    AlreadyPublished { slug: String, release_key: String },

    /// There is no pending submission to act on.
    #[error("No pending submission")]
    NothingPending,

    /// A required form field could not be filled.
    #[error("Form field not filled: {0}")]
    FieldNotFilled(String),

    /// The release has a live submit lock.
    #[error("{slug} {release_key} is locked until its submit is confirmed or the lock expires")]
    Locked { slug: String, release_key: String },

    /// Persisting lifecycle state failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors that fail the sync of one novel.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The slug is not in the catalog.
    #[error("Unknown novel: {0}")]
    UnknownNovel(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Errors that can occur while loading cookies.
#[derive(Error, Debug)]
pub enum CookieError {
    /// Failed to read or walk the filesystem.
    #[error("Failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// Cookie file contains an invalid line.
    #[error("Invalid Netscape cookie line: {0}")]
    InvalidLine(String),

    /// Cookie domain could not be converted into a URL.
    #[error("Invalid cookie domain: {0}")]
    InvalidDomain(String),
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
