//! Image builders
//!
//! The cache hands the builder only the artifacts it could not resolve.
//! A batch either builds completely or fails as a whole.

use crate::artifact::{hash_tag, Artifact, BuildResult};
use crate::error::{SkiffError, SkiffResult};
use crate::orchestration::daemon::DaemonClient;
use crate::orchestration::podman::PodmanDaemon;
use crate::orchestration::{build_error_output, stream_child_output};
use crate::ui::{BuildProgress, UiContext};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Builds a batch of artifacts into images
#[async_trait]
pub trait Builder: Send + Sync {
    /// Build every artifact, one result per input, or fail the batch
    async fn build(&self, artifacts: &[Artifact]) -> SkiffResult<Vec<BuildResult>>;
}

/// Tag a freshly built image gets: the hash tag, or `latest` when unhashed
pub fn build_tag(artifact: &Artifact) -> String {
    artifact
        .hash_tag()
        .unwrap_or_else(|| hash_tag(&artifact.image_name, "latest"))
}

/// Dockerfile builder backed by `podman build`
pub struct PodmanBuilder {
    daemon: PodmanDaemon,
    push: bool,
    ui: UiContext,
}

impl PodmanBuilder {
    pub fn new(daemon: PodmanDaemon, push: bool, ui: UiContext) -> Self {
        Self { daemon, push, ui }
    }

    fn build_args(artifact: &Artifact, tag: &str) -> Vec<String> {
        let dockerfile = artifact.context.join(&artifact.dockerfile);
        let mut args = vec![
            "build".to_string(),
            "-t".to_string(),
            tag.to_string(),
            "-f".to_string(),
            dockerfile.to_string_lossy().to_string(),
        ];
        for (key, value) in &artifact.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(artifact.context.to_string_lossy().to_string());
        args
    }

    async fn build_one(&self, artifact: &Artifact) -> SkiffResult<BuildResult> {
        let tag = build_tag(artifact);
        let args = Self::build_args(artifact, &tag);
        debug!("Building image: {} {:?}", self.daemon.binary(), args);

        let mut child = Command::new(self.daemon.binary())
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SkiffError::command_failed(format!("{} build", self.daemon.binary()), e))?;

        let progress = BuildProgress::new(&self.ui, &artifact.image_name);
        let output = stream_child_output(&mut child, &|line| progress.on_line(line)).await?;
        let status = child
            .wait()
            .await
            .map_err(|e| SkiffError::command_failed(format!("{} build", self.daemon.binary()), e))?;
        progress.finish();

        if !status.success() {
            return Err(SkiffError::ImageBuild {
                image: artifact.image_name.clone(),
                reason: build_error_output(&output),
            });
        }
        info!("Built {}", tag);

        if self.push {
            self.daemon.push(&tag).await?;
        }

        let digest = self.daemon.image_digest(&tag).await?;
        Ok(BuildResult {
            image_name: artifact.image_name.clone(),
            tag,
            digest,
        })
    }
}

#[async_trait]
impl Builder for PodmanBuilder {
    async fn build(&self, artifacts: &[Artifact]) -> SkiffResult<Vec<BuildResult>> {
        let mut results = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            results.push(self.build_one(artifact).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn build_tag_prefers_hash() {
        let artifact = Artifact::new("web");
        assert_eq!(build_tag(&artifact), "web:latest");
        assert_eq!(build_tag(&artifact.with_hash("abc")), "web:abc");
    }

    #[test]
    fn build_args_include_dockerfile_and_args() {
        let mut artifact = Artifact::new("web").with_hash("abc");
        artifact.context = PathBuf::from("/project/web");
        artifact.dockerfile = "docker/Dockerfile.dev".to_string();
        artifact
            .build_args
            .insert("PROFILE".to_string(), "dev".to_string());

        let args = PodmanBuilder::build_args(&artifact, "web:abc");
        assert_eq!(
            args,
            vec![
                "build",
                "-t",
                "web:abc",
                "-f",
                "/project/web/docker/Dockerfile.dev",
                "--build-arg",
                "PROFILE=dev",
                "/project/web",
            ]
        );
    }
}
