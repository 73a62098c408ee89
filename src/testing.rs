//! In-memory collaborators for unit tests

use crate::artifact::{Artifact, BuildResult};
use crate::cache::{HashComputer, ImageListSnapshot, ImageSummary};
use crate::error::{SkiffError, SkiffResult};
use crate::orchestration::{build_tag, Builder, DaemonClient, RegistryClient};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Daemon backed by fixed tag/digest tables and an image list
#[derive(Default)]
pub struct FakeDaemon {
    tags: HashMap<String, String>,
    digests: HashMap<String, String>,
    images: Vec<ImageSummary>,
    fail_queries: bool,
    fail_retag: bool,
    hang: bool,
    calls: AtomicUsize,
    lists: AtomicUsize,
    retagged: Mutex<Vec<(String, String)>>,
    pushed: Mutex<Vec<String>>,
}

impl FakeDaemon {
    /// `tag` exists locally as image `id`
    pub fn with_tag(mut self, tag: &str, id: &str) -> Self {
        self.tags.insert(tag.to_string(), id.to_string());
        self
    }

    pub fn with_digest(mut self, tag: &str, digest: &str) -> Self {
        self.digests.insert(tag.to_string(), digest.to_string());
        self
    }

    pub fn with_image(mut self, image: ImageSummary) -> Self {
        self.images.push(image);
        self
    }

    /// Every query fails like an unreachable daemon
    pub fn failing_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    pub fn failing_retag(mut self) -> Self {
        self.fail_retag = true;
        self
    }

    /// Every query blocks forever
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Number of daemon calls of any kind
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn retagged(&self) -> Vec<(String, String)> {
        self.retagged.lock().unwrap().clone()
    }

    pub fn pushed(&self) -> Vec<String> {
        self.pushed.lock().unwrap().clone()
    }

    async fn enter(&self, command: &str) -> SkiffResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail_queries {
            return Err(SkiffError::command_exec(command, "cannot connect to daemon"));
        }
        Ok(())
    }
}

#[async_trait]
impl DaemonClient for FakeDaemon {
    async fn tag_exists(&self, tag: &str) -> SkiffResult<bool> {
        self.enter("image exists").await?;
        Ok(self.tags.contains_key(tag))
    }

    async fn resolve_tag_to_id(&self, tag: &str) -> SkiffResult<Option<String>> {
        self.enter("image inspect").await?;
        Ok(self.tags.get(tag).cloned())
    }

    async fn image_digest(&self, tag: &str) -> SkiffResult<Option<String>> {
        self.enter("image inspect").await?;
        Ok(self.digests.get(tag).cloned())
    }

    async fn list_images(&self) -> SkiffResult<ImageListSnapshot> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.enter("images").await?;
        Ok(ImageListSnapshot::new(self.images.clone()))
    }

    async fn retag(&self, old_tag: &str, new_tag: &str) -> SkiffResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_retag {
            return Err(SkiffError::ImageRetag {
                from: old_tag.to_string(),
                to: new_tag.to_string(),
                reason: "no such image".to_string(),
            });
        }
        self.retagged
            .lock()
            .unwrap()
            .push((old_tag.to_string(), new_tag.to_string()));
        Ok(())
    }

    async fn push(&self, tag: &str) -> SkiffResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pushed.lock().unwrap().push(tag.to_string());
        Ok(())
    }

    fn runtime_name(&self) -> &'static str {
        "fake"
    }
}

/// Registry with a fixed reference → digest table
#[derive(Default)]
pub struct FakeRegistry {
    digests: HashMap<String, String>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn with_digest(mut self, reference: &str, digest: &str) -> Self {
        self.digests.insert(reference.to_string(), digest.to_string());
        self
    }

    /// A registry that always errors
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn remote_digest(&self, reference: &str) -> SkiffResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SkiffError::registry(reference, "connection refused"));
        }
        Ok(self.digests.get(reference).cloned())
    }
}

/// Hasher with precomputed hashes per image name; unknown images fail
pub struct FakeHasher {
    hashes: HashMap<String, String>,
    calls: AtomicUsize,
}

impl FakeHasher {
    pub fn new(hashes: &[(&str, &str)]) -> Self {
        Self {
            hashes: hashes
                .iter()
                .map(|(image, hash)| (image.to_string(), hash.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HashComputer for FakeHasher {
    async fn compute_hash(&self, artifact: &Artifact) -> SkiffResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hashes
            .get(&artifact.image_name)
            .cloned()
            .ok_or_else(|| SkiffError::Hash {
                image: artifact.image_name.clone(),
                reason: "no such file or directory".to_string(),
            })
    }
}

/// Builder that "builds" instantly with digest `sha256:built-<image>`
#[derive(Default)]
pub struct FakeBuilder {
    fail: bool,
    built: Mutex<Vec<Artifact>>,
}

impl FakeBuilder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every artifact handed to `build`, in call order
    pub fn built(&self) -> Vec<Artifact> {
        self.built.lock().unwrap().clone()
    }
}

#[async_trait]
impl Builder for FakeBuilder {
    async fn build(&self, artifacts: &[Artifact]) -> SkiffResult<Vec<BuildResult>> {
        self.built.lock().unwrap().extend(artifacts.iter().cloned());
        if self.fail {
            return Err(SkiffError::ImageBuild {
                image: artifacts
                    .first()
                    .map(|a| a.image_name.clone())
                    .unwrap_or_default(),
                reason: "exit status 1".to_string(),
            });
        }
        Ok(artifacts
            .iter()
            .map(|a| {
                BuildResult::new(&a.image_name, build_tag(a))
                    .with_digest(format!("sha256:built-{}", a.image_name))
            })
            .collect())
    }
}
