//! Content-addressed task output cache
//!
//! A cache key is derived from the declared inputs of a task: a scope
//! name, the contents of dependency-lock files, a tool version, the host
//! OS, and free-form input values. A hit short-circuits the task; any
//! cache failure degrades to a miss.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCacheStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Hashed in place of a file that does not exist
const MISSING_FILE_MARKER: &[u8] = b"\0missing\0";

/// Declared inputs a task's cache key is derived from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKeySpec {
    /// Namespace, e.g. `deps`
    pub scope: String,

    /// Files whose contents feed the key (relative to the task directory)
    #[serde(default)]
    pub files: Vec<String>,

    #[serde(default)]
    pub tool_version: Option<String>,

    /// Defaults to the host OS
    #[serde(default)]
    pub os: Option<String>,

    /// Extra values, rendered before hashing
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

/// A computed cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub scope: String,
    /// Hex SHA-256 of the key inputs
    pub hash: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.scope, &self.hash[..self.hash.len().min(16)])
    }
}

/// A stored task outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub task_name: String,
    pub output: String,
    #[serde(default)]
    pub artifact_ref: Option<String>,
    /// Exports replayed into the run context on a hit
    #[serde(default)]
    pub exports: HashMap<String, String>,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache backend error: {0}")]
    Backend(String),
}

fn update_field(hasher: &mut Sha256, label: &str, value: &[u8]) {
    hasher.update(label.as_bytes());
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value);
}

impl CacheKeySpec {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Self::default()
        }
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = Some(version.into());
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    /// OS component of the key
    pub fn os(&self) -> &str {
        self.os.as_deref().unwrap_or(std::env::consts::OS)
    }

    /// Compute the key, reading `files` relative to `base_dir`.
    ///
    /// Identical inputs always produce an identical key; a change to any
    /// file's contents, the tool version, the OS, or an input changes it.
    pub async fn compute(&self, base_dir: &Path) -> Result<CacheKey, CacheError> {
        let mut hasher = Sha256::new();
        update_field(&mut hasher, "scope", self.scope.as_bytes());
        update_field(
            &mut hasher,
            "tool_version",
            self.tool_version.as_deref().unwrap_or_default().as_bytes(),
        );
        update_field(&mut hasher, "os", self.os().as_bytes());

        for file in &self.files {
            update_field(&mut hasher, "file", file.as_bytes());
            match tokio::fs::read(base_dir.join(file)).await {
                Ok(contents) => update_field(&mut hasher, "contents", &contents),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Cache input {} does not exist", file);
                    update_field(&mut hasher, "contents", MISSING_FILE_MARKER);
                }
                Err(e) => return Err(e.into()),
            }
        }

        for (key, value) in &self.inputs {
            update_field(&mut hasher, "input", key.as_bytes());
            update_field(&mut hasher, "value", value.as_bytes());
        }

        Ok(CacheKey {
            scope: self.scope.clone(),
            hash: hex::encode(hasher.finalize()),
        })
    }
}

/// Storage backend for cache entries.
///
/// Concurrent stores to the same key must not corrupt the entry; the last
/// write wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError>;

    /// All entries, newest first
    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError>;
}

/// Process-local cache
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut entries: Vec<CacheEntry> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        Ok(entries)
    }
}
