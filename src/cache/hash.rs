//! Workspace fingerprinting
//!
//! Produces the content hash that keys the cache index. Same build
//! configuration and same dependency contents = same hash.

use crate::artifact::Artifact;
use crate::error::{SkiffError, SkiffResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Strategy that fingerprints an artifact's inputs
#[async_trait]
pub trait HashComputer: Send + Sync {
    /// Deterministic hash of build configuration and dependency contents
    async fn compute_hash(&self, artifact: &Artifact) -> SkiffResult<String>;
}

/// SHA-256 over build configuration plus every dependency file
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyHasher;

impl DependencyHasher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HashComputer for DependencyHasher {
    async fn compute_hash(&self, artifact: &Artifact) -> SkiffResult<String> {
        let artifact = artifact.clone();
        tokio::task::spawn_blocking(move || hash_artifact(&artifact))
            .await
            .map_err(|e| SkiffError::Internal(format!("hash task failed: {}", e)))?
    }
}

/// Length-prefix each field so adjacent fields can't alias
fn feed(hasher: &mut Sha256, data: &[u8]) {
    hasher.update((data.len() as u64).to_le_bytes());
    hasher.update(data);
}

fn hash_artifact(artifact: &Artifact) -> SkiffResult<String> {
    let files = collect_dependencies(artifact)?;

    let mut hasher = Sha256::new();
    feed(&mut hasher, artifact.image_name.as_bytes());
    feed(&mut hasher, artifact.dockerfile.as_bytes());
    for (key, value) in &artifact.build_args {
        feed(&mut hasher, key.as_bytes());
        feed(&mut hasher, value.as_bytes());
    }

    for (relative, path) in &files {
        let contents = fs::read(path).map_err(|e| SkiffError::Hash {
            image: artifact.image_name.clone(),
            reason: format!("reading {}: {}", path.display(), e),
        })?;
        feed(&mut hasher, relative.as_bytes());
        feed(&mut hasher, &contents);
    }

    let hash = hex::encode(hasher.finalize());
    debug!(
        "Hashed {} over {} file(s): {}",
        artifact.image_name,
        files.len(),
        hash
    );
    Ok(hash)
}

/// Dependency files keyed by context-relative path, in sorted order
fn collect_dependencies(artifact: &Artifact) -> SkiffResult<BTreeMap<String, PathBuf>> {
    let context = &artifact.context;
    let hash_err = |reason: String| SkiffError::Hash {
        image: artifact.image_name.clone(),
        reason,
    };

    if !context.is_dir() {
        return Err(hash_err(format!(
            "context {} is not a directory",
            context.display()
        )));
    }

    let roots: Vec<PathBuf> = if artifact.dependencies.is_empty() {
        vec![context.clone()]
    } else {
        let mut roots = Vec::with_capacity(artifact.dependencies.len() + 1);
        for dep in &artifact.dependencies {
            if !is_contained(dep) {
                return Err(hash_err(format!(
                    "dependency {} is outside the build context",
                    dep.display()
                )));
            }
            roots.push(context.join(dep));
        }
        roots.push(context.join(&artifact.dockerfile));
        roots
    };

    let mut files = BTreeMap::new();
    for root in roots {
        if !root.exists() {
            return Err(hash_err(format!("dependency {} not found", root.display())));
        }
        walk(&root, context, &mut files).map_err(|e| hash_err(e.to_string()))?;
    }

    Ok(files)
}

/// Relative path that stays inside the context
fn is_contained(dep: &Path) -> bool {
    dep.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Regular files under `root`. Symlinks inside the tree are not followed.
fn walk(
    root: &Path,
    context: &Path,
    files: &mut BTreeMap<String, PathBuf>,
) -> Result<(), walkdir::Error> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(context)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        files.insert(relative, path.to_path_buf());
    }
    Ok(())
}
