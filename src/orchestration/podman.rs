//! Podman-backed daemon client
//!
//! Drives the `podman` CLI (or a compatible binary) with `tokio::process`.

use crate::cache::{ImageListSnapshot, ImageSummary};
use crate::error::{SkiffError, SkiffResult};
use crate::orchestration::daemon::DaemonClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Daemon client using the local Podman CLI
#[derive(Debug, Clone)]
pub struct PodmanDaemon {
    binary: String,
}

/// One entry of `podman images --format json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PodmanImage {
    #[serde(default)]
    id: String,
    #[serde(default)]
    names: Option<Vec<String>>,
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
    #[serde(default)]
    repo_digests: Option<Vec<String>>,
    #[serde(default)]
    digest: Option<String>,
}

impl From<PodmanImage> for ImageSummary {
    fn from(image: PodmanImage) -> Self {
        let mut repo_tags = image.names.unwrap_or_default();
        for tag in image.repo_tags.unwrap_or_default() {
            if !repo_tags.contains(&tag) {
                repo_tags.push(tag);
            }
        }

        let mut repo_digests = image.repo_digests.unwrap_or_default();
        if let Some(digest) = image.digest.filter(|d| !d.is_empty()) {
            if !repo_digests.iter().any(|d| d.ends_with(&digest)) {
                repo_digests.push(digest);
            }
        }

        ImageSummary {
            id: image.id,
            repo_tags,
            repo_digests,
        }
    }
}

/// Parse `podman images --format json` output
pub(crate) fn parse_image_list(json: &str) -> SkiffResult<ImageListSnapshot> {
    let trimmed = json.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(ImageListSnapshot::default());
    }

    let images: Vec<PodmanImage> = serde_json::from_str(trimmed)?;
    Ok(ImageListSnapshot::new(
        images.into_iter().map(ImageSummary::from).collect(),
    ))
}

impl PodmanDaemon {
    /// Create a client for the given container CLI binary
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// The CLI binary being driven
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Check if the CLI is installed and responding
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Execute a CLI command and return the output
    pub(crate) async fn exec(&self, args: &[&str]) -> SkiffResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.binary, args);

        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SkiffError::command_failed(format!("{} {:?}", self.binary, args), e))
    }

    /// Run `image inspect` with a Go template, `None` if the image is absent
    async fn inspect(&self, tag: &str, format: &str) -> SkiffResult<Option<String>> {
        let output = self
            .exec(&["image", "inspect", "--format", format, tag])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no such image") || stderr.contains("image not known") {
                return Ok(None);
            }
            return Err(SkiffError::command_exec(
                format!("{} image inspect", self.binary),
                stderr,
            ));
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() || value == "<no value>" {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }
}

impl Default for PodmanDaemon {
    fn default() -> Self {
        Self::new("podman")
    }
}

#[async_trait]
impl DaemonClient for PodmanDaemon {
    async fn tag_exists(&self, tag: &str) -> SkiffResult<bool> {
        let output = self.exec(&["image", "exists", tag]).await?;
        Ok(output.status.success())
    }

    async fn resolve_tag_to_id(&self, tag: &str) -> SkiffResult<Option<String>> {
        self.inspect(tag, "{{.Id}}").await
    }

    async fn image_digest(&self, tag: &str) -> SkiffResult<Option<String>> {
        self.inspect(tag, "{{.Digest}}").await
    }

    async fn list_images(&self) -> SkiffResult<ImageListSnapshot> {
        let output = self.exec(&["images", "--format", "json"]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SkiffError::command_exec(
                format!("{} images", self.binary),
                stderr,
            ));
        }

        let snapshot = parse_image_list(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Listed {} local images", snapshot.images().len());
        Ok(snapshot)
    }

    async fn retag(&self, old_tag: &str, new_tag: &str) -> SkiffResult<()> {
        debug!("Tagging {} as {}", old_tag, new_tag);
        let output = self.exec(&["tag", old_tag, new_tag]).await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(SkiffError::ImageRetag {
                from: old_tag.to_string(),
                to: new_tag.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    async fn push(&self, tag: &str) -> SkiffResult<()> {
        info!("Pushing image: {}", tag);
        let output = self.exec(&["push", tag]).await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(SkiffError::ImagePush {
                image: tag.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    fn runtime_name(&self) -> &'static str {
        "Podman"
    }
}
