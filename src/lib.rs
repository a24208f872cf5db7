//! SynNovel - keeps a private web novel catalog in sync with a public
//! release tracker.
//!
//! This library provides functionality for:
//! - Working out which chapters still need a release entry on the tracker
//! - Resolving novels to tracker series pages and scanning their releases
//! - Filling the tracker's add-release form and reconciling the outcome

pub mod classifier;
pub mod config;
pub mod console;
mod cookies;
pub mod dom;
pub mod error;
pub mod model;
pub mod pending;
pub mod release;
pub mod request;
pub mod resolver;
pub mod scanner;
pub mod site;
pub mod store;
pub mod submission;
pub mod sync;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::Config;
pub use console::Console;
pub use error::{
    ConfigError, DomError, RequestError, ResolveError, ScanError, StoreError, SubmissionError,
    SyncError,
};
pub use model::{Chapter, Document, Novel, NovelConfig, PendingItem, ReleaseFormat};
pub use pending::build_pending;
pub use release::{ReleaseKey, extract_release_key, to_release_key};
pub use request::{RemoteFetch, RequestLayer};
pub use resolver::SeriesResolver;
pub use scanner::CatalogScanner;
pub use store::{JsonFileStore, MemoryStore, Store};
pub use submission::{SubmissionManager, SubmitLedger, WatchOutcome};
pub use sync::{SyncOrchestrator, SyncReport};
