//! Configuration schema for Skiff
//!
//! Configuration is stored in the project's `skiff.toml`

use crate::artifact::Artifact;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Build cache settings
    pub cache: CacheConfig,

    /// Local container daemon settings
    pub daemon: DaemonConfig,

    /// Remote registry settings
    pub registry: RegistryConfig,

    /// Buildable artifacts
    pub artifacts: Vec<Artifact>,
}

impl Config {
    /// First image name configured more than once
    pub fn duplicate_artifact(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.artifacts
            .iter()
            .map(|a| a.image_name.as_str())
            .find(|name| !seen.insert(*name))
    }

    /// Resolve artifact context directories relative to `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for artifact in &mut self.artifacts {
            if artifact.context.is_relative() {
                artifact.context = base.join(&artifact.context);
            }
        }
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Build cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the build cache (default: true)
    pub enabled: bool,

    /// Cluster consumes images straight from the local daemon
    pub local_cluster: bool,

    /// Push retagged images to the registry
    pub push_images: bool,

    /// Maximum artifacts hashed and classified at once
    pub concurrency: usize,

    /// Upper bound for a single daemon or registry query
    pub query_timeout_secs: u64,

    /// Override for the persisted index location
    pub index_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            local_cluster: true,
            push_images: false,
            concurrency: 4,
            query_timeout_secs: 30,
            index_path: None,
        }
    }
}

/// Local container daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Use the local daemon at all
    pub enabled: bool,

    /// Container CLI to invoke
    pub binary: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "podman".to_string(),
        }
    }
}

/// Remote registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registries reached over plain HTTP
    pub insecure: Vec<String>,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            insecure: vec![],
            timeout_secs: 10,
        }
    }
}
