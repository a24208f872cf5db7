//! Persistence of the shared JSON document.
//!
//! The store is a whole-document get/set interface with path-addressed
//! helpers on top. Writers re-read before every mutation; there is no
//! locking against concurrent writers.

use crate::console::Console;
use crate::error::StoreError;
use crate::model::{Document, PublishedRecord};
use crate::release::ReleaseKey;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Storage collaborator.
#[async_trait]
pub trait Store: Send + Sync {
    /// Current document. A missing or malformed document reads as the default.
    async fn get(&self) -> Result<Document, StoreError>;

    /// Replaces the document, stamping `meta.lastUpdated`. Returns what was stored.
    async fn set(&self, doc: Document) -> Result<Document, StoreError>;

    /// Sets the value at a dotted camelCase path, creating objects on the way.
    async fn update(&self, path: &str, value: Value) -> Result<Document, StoreError> {
        let mut root = serde_json::to_value(self.get().await?)?;
        set_value_at(&mut root, path, value)?;
        let doc: Document = serde_json::from_value(root)?;
        self.set(doc).await
    }

    /// Value at a dotted camelCase path, or `default` when absent.
    async fn get_path(&self, path: &str, default: Value) -> Result<Value, StoreError> {
        let root = serde_json::to_value(self.get().await?)?;
        Ok(value_at(&root, path).cloned().unwrap_or(default))
    }

    /// Adds one key to a novel's published set.
    async fn add_published_release(
        &self,
        slug: &str,
        release_key: ReleaseKey,
    ) -> Result<Document, StoreError> {
        let mut doc = self.get().await?;
        let now = Utc::now();
        let record = doc
            .published_releases
            .entry(slug.to_string())
            .or_insert_with(|| PublishedRecord {
                remote_slug: String::new(),
                last_scanned_at: now,
                releases: Default::default(),
            });
        record.releases.insert(release_key);
        record.last_scanned_at = now;
        self.set(doc).await
    }
}

fn value_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(root, |current, key| current.as_object()?.get(key))
}

fn set_value_at(root: &mut Value, path: &str, value: Value) -> Result<(), StoreError> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }

    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

    let mut cursor = root;
    for key in parents {
        let object = cursor
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        let entry = object
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        cursor = entry;
    }

    cursor
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?
        .insert(last.to_string(), value);
    Ok(())
}

fn stamp(mut doc: Document) -> Document {
    doc.meta.last_updated = Some(Utc::now());
    if doc.meta.version.is_empty() {
        doc.meta.version = crate::model::DOCUMENT_VERSION.to_string();
    }
    doc
}

/// Document kept in one JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    console: Console,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, console: Console) -> Self {
        Self {
            path: path.into(),
            console,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn get(&self) -> Result<Document, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::default()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                self.console.warning(&format!(
                    "Ignoring malformed store {}: {}",
                    self.path.display(),
                    e
                ));
                Ok(Document::default())
            }
        }
    }

    async fn set(&self, doc: Document) -> Result<Document, StoreError> {
        let doc = stamp(doc);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Readers never see a partially written file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(&doc)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        Ok(doc)
    }
}

/// Document held in memory.
#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<Document>,
}

impl MemoryStore {
    pub fn new(doc: Document) -> Self {
        Self {
            doc: Mutex::new(doc),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self) -> Result<Document, StoreError> {
        Ok(self
            .doc
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn set(&self, doc: Document) -> Result<Document, StoreError> {
        let doc = stamp(doc);
        *self.doc.lock().unwrap_or_else(PoisonError::into_inner) = doc.clone();
        Ok(doc)
    }
}
