//! Persisted hash → image index
//!
//! The index is a best-effort accelerator. A missing or corrupt file loads
//! as an empty cache, and writes go through a temp file + rename so a run
//! that dies mid-persist never leaves a half-written index behind.

use crate::error::{SkiffError, SkiffResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Cached image identity for one workspace hash
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDetails {
    /// Registry-style content digest (`sha256:...`)
    #[serde(default)]
    pub digest: String,

    /// Daemon-assigned image ID, empty if never materialized locally
    #[serde(default)]
    pub id: String,
}

impl ImageDetails {
    pub fn new(digest: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            id: id.into(),
        }
    }

    /// Details known only by digest
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self::new(digest, "")
    }
}

/// Workspace hash → image details
pub type ArtifactCache = BTreeMap<String, ImageDetails>;

/// In-memory index bound to its file on disk
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
    entries: ArtifactCache,
}

impl CacheStore {
    /// An empty store that will persist to `path`
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            entries: ArtifactCache::new(),
        }
    }

    /// A store seeded with entries (not read from disk)
    pub fn with_entries(path: PathBuf, entries: ArtifactCache) -> Self {
        Self { path, entries }
    }

    /// Load the index from `path`, falling back to an empty cache
    pub async fn load(path: PathBuf) -> Self {
        match read_index(&path).await {
            Ok(Some(entries)) => {
                debug!("Loaded {} cache entries from {}", entries.len(), path.display());
                Self { path, entries }
            }
            Ok(None) => {
                debug!("No cache index at {}, starting empty", path.display());
                Self::empty(path)
            }
            Err(e) => {
                warn!("Ignoring unreadable cache index: {}", e);
                Self::empty(path)
            }
        }
    }

    pub fn get(&self, hash: &str) -> Option<&ImageDetails> {
        self.entries.get(hash)
    }

    /// Insert or wholesale-replace the entry for `hash`
    pub fn set(&mut self, hash: impl Into<String>, details: ImageDetails) {
        self.entries.insert(hash.into(), details);
    }

    /// Replace every entry at once
    pub fn replace(&mut self, entries: ArtifactCache) {
        self.entries = entries;
    }

    pub fn entries(&self) -> &ArtifactCache {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the index atomically
    pub async fn persist(&self) -> SkiffResult<()> {
        let persist_err = |reason: String| SkiffError::CachePersist {
            path: self.path.clone(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| persist_err(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");

        fs::write(&tmp, content)
            .await
            .map_err(|e| persist_err(e.to_string()))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| persist_err(e.to_string()))?;

        info!("Saved {} cache entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    /// Remove the index file and all in-memory entries
    pub async fn clear(&mut self) -> SkiffResult<()> {
        self.entries.clear();
        if self.path.exists() {
            fs::remove_file(&self.path).await.map_err(|e| {
                SkiffError::io(format!("removing cache index {}", self.path.display()), e)
            })?;
        }
        Ok(())
    }
}

async fn read_index(path: &Path) -> SkiffResult<Option<ArtifactCache>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| SkiffError::io(format!("reading cache index {}", path.display()), e))?;

    if content.trim().is_empty() {
        return Ok(Some(ArtifactCache::new()));
    }

    let entries: ArtifactCache = serde_json::from_str(&content)?;
    Ok(Some(entries))
}
