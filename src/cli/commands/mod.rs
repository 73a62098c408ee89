//! CLI command implementations

pub mod build;
pub mod cache;
pub mod config;

pub use build::execute as build;
pub use cache::execute as cache;
pub use config::execute as config;

use crate::artifact::Artifact;
use crate::config::Config;
use crate::error::{SkiffError, SkiffResult};
use std::collections::HashSet;

/// Configured artifacts, narrowed to `names` when any are given
pub(crate) fn select_artifacts(config: &Config, names: &[String]) -> SkiffResult<Vec<Artifact>> {
    if config.artifacts.is_empty() {
        return Err(SkiffError::User(
            "No artifacts configured. Add [[artifacts]] entries to skiff.toml".to_string(),
        ));
    }

    if let Some(image) = config.duplicate_artifact() {
        return Err(SkiffError::User(format!(
            "Artifact {} is configured more than once",
            image
        )));
    }

    if names.is_empty() {
        return Ok(config.artifacts.clone());
    }

    let mut seen = HashSet::new();
    names
        .iter()
        .filter(|name| seen.insert(name.as_str()))
        .map(|name| {
            config
                .artifacts
                .iter()
                .find(|a| &a.image_name == name)
                .cloned()
                .ok_or_else(|| SkiffError::UnknownArtifact(name.clone()))
        })
        .collect()
}
