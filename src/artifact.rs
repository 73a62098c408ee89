//! Buildable artifacts and build results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A logical build unit, keyed by image name within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Image repository name (no tag)
    #[serde(rename = "image")]
    pub image_name: String,

    /// Build context directory
    #[serde(default = "default_context")]
    pub context: PathBuf,

    /// Dockerfile path, relative to the context
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,

    /// Build arguments passed to the builder
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,

    /// Dependency paths relative to the context (empty = whole context)
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,

    /// Fingerprint computed for this run
    #[serde(skip)]
    pub workspace_hash: Option<String>,
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

impl Artifact {
    /// Create an artifact with default context and Dockerfile
    pub fn new(image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            context: default_context(),
            dockerfile: default_dockerfile(),
            build_args: BTreeMap::new(),
            dependencies: vec![],
            workspace_hash: None,
        }
    }

    /// Set the computed workspace hash
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.workspace_hash = Some(hash.into());
        self
    }

    /// The canonical `<image>:<workspace hash>` tag, once hashed
    pub fn hash_tag(&self) -> Option<String> {
        self.workspace_hash
            .as_deref()
            .map(|hash| hash_tag(&self.image_name, hash))
    }
}

/// Build the canonical tag for an image and workspace hash
pub fn hash_tag(image_name: &str, hash: &str) -> String {
    format!("{}:{}", image_name, hash)
}

/// A built or cache-resolved image handed to the deployer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    /// Image repository name
    pub image_name: String,

    /// Fully resolved tag
    pub tag: String,

    /// Content digest, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl BuildResult {
    pub fn new(image_name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            tag: tag.into(),
            digest: None,
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }
}

/// Sort results by image name so output never depends on completion order
pub fn sort_results(results: &mut [BuildResult]) {
    results.sort_by(|a, b| a.image_name.cmp(&b.image_name));
}

/// Sort artifacts by image name
pub fn sort_artifacts(artifacts: &mut [Artifact]) {
    artifacts.sort_by(|a, b| a.image_name.cmp(&b.image_name));
}
