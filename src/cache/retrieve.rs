//! Cache retrieval: decide per artifact whether to reuse, retag or rebuild
//!
//! For each artifact the workspace hash is looked up in the index. A hit is
//! only trusted once the target environment confirms content-identical bits
//! under the hash tag:
//!
//! | Cluster | Confirmed by | Fallback |
//! |---------|--------------|----------|
//! | local | daemon has `<image>:<hash>` with the cached digest | retag a prebuilt local image |
//! | remote | registry serves `<image>:<hash>` at the cached digest | retag + push a prebuilt local image |
//!
//! Anything that goes wrong for a single artifact downgrades it to a
//! rebuild. Only cancellation aborts the batch.

use crate::artifact::{hash_tag, sort_artifacts, sort_results, Artifact, BuildResult};
use crate::cache::hash::HashComputer;
use crate::cache::snapshot::{same_image_id, ImageListSnapshot};
use crate::cache::store::{ArtifactCache, ImageDetails};
use crate::cancel::Cancellation;
use crate::config::schema::CacheConfig;
use crate::error::{SkiffError, SkiffResult};
use crate::orchestration::{DaemonClient, RegistryClient};
use futures_util::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run-level cache switches
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Consult the cache at all
    pub use_cache: bool,
    /// Images are consumed from the local daemon rather than a registry
    pub local_cluster: bool,
    /// Retagged images must also be pushed
    pub push_images: bool,
    /// Artifacts classified concurrently
    pub concurrency: usize,
    /// Bound on each daemon/registry query
    pub query_timeout: Duration,
}

impl CacheOptions {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            use_cache: config.enabled,
            local_cluster: config.local_cluster,
            push_images: config.push_images,
            concurrency: config.concurrency.max(1),
            query_timeout: Duration::from_secs(config.query_timeout_secs.max(1)),
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Per-artifact decision record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedArtifactDetails {
    /// No usable cached image, hand to the builder
    pub needs_rebuild: bool,
    /// `prebuilt_image` must be tagged as `hash_tag` first
    pub needs_retag: bool,
    /// `hash_tag` must be pushed after retagging
    pub needs_push: bool,
    /// Canonical `<image>:<workspace hash>`
    pub hash_tag: String,
    /// Existing local tag with identical content, may be empty
    pub prebuilt_image: String,
}

impl CachedArtifactDetails {
    pub fn rebuild() -> Self {
        Self {
            needs_rebuild: true,
            ..Self::default()
        }
    }

    /// Hash tag confirmed in the local daemon
    pub fn local_hit(hash_tag: impl Into<String>) -> Self {
        let hash_tag = hash_tag.into();
        Self {
            prebuilt_image: hash_tag.clone(),
            hash_tag,
            ..Self::default()
        }
    }

    /// Hash tag confirmed in the registry
    pub fn remote_hit(hash_tag: impl Into<String>) -> Self {
        Self {
            hash_tag: hash_tag.into(),
            ..Self::default()
        }
    }

    pub fn retag(
        prebuilt_image: impl Into<String>,
        hash_tag: impl Into<String>,
        needs_push: bool,
    ) -> Self {
        Self {
            needs_retag: true,
            needs_push,
            hash_tag: hash_tag.into(),
            prebuilt_image: prebuilt_image.into(),
            ..Self::default()
        }
    }
}

/// Outcome of classifying one artifact
#[derive(Debug)]
pub struct Classification {
    /// The artifact, carrying its workspace hash when hashing succeeded
    pub artifact: Artifact,
    /// Cached image identity for the hash, if the index had one
    pub cached: Option<ImageDetails>,
    /// The decision, or the recoverable error that forces a rebuild
    pub decision: SkiffResult<CachedArtifactDetails>,
}

impl Classification {
    pub fn needs_rebuild(&self) -> bool {
        self.decision.as_ref().map_or(true, |d| d.needs_rebuild)
    }
}

/// Artifacts partitioned by the cache
#[derive(Debug, Default)]
pub struct Retrieval {
    /// Artifacts to hand to the builder, sorted by image name
    pub needs_build: Vec<Artifact>,
    /// Artifacts resolved without building, sorted by image name
    pub resolved: Vec<BuildResult>,
}

/// Decision engine combining the index, the daemon and the registry
pub struct CacheRetriever {
    options: CacheOptions,
    hasher: Arc<dyn HashComputer>,
    daemon: Option<Arc<dyn DaemonClient>>,
    registry: Option<Arc<dyn RegistryClient>>,
}

enum Outcome {
    Build(Artifact),
    Resolved(BuildResult),
}

impl CacheRetriever {
    pub fn new(options: CacheOptions, hasher: Arc<dyn HashComputer>) -> Self {
        Self {
            options,
            hasher,
            daemon: None,
            registry: None,
        }
    }

    pub fn with_daemon(mut self, daemon: Arc<dyn DaemonClient>) -> Self {
        self.daemon = Some(daemon);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    async fn query<T, F>(&self, cancel: &Cancellation, operation: &str, fut: F) -> SkiffResult<T>
    where
        F: Future<Output = SkiffResult<T>>,
    {
        cancel
            .run_with_timeout(operation, self.options.query_timeout, fut)
            .await
    }

    /// Fetch the daemon's image list once for the whole run
    pub async fn fetch_snapshot(&self, cancel: &Cancellation) -> SkiffResult<ImageListSnapshot> {
        let Some(daemon) = &self.daemon else {
            return Ok(ImageListSnapshot::default());
        };

        match self.query(cancel, "list images", daemon.list_images()).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Could not list local images, prebuilt lookup disabled: {}", e);
                Ok(ImageListSnapshot::default())
            }
        }
    }

    /// Split `artifacts` into those resolved from the cache and those to build.
    ///
    /// Resolved artifacts have already been retagged (and pushed) as needed.
    pub async fn retrieve_cached_artifacts(
        &self,
        artifacts: Vec<Artifact>,
        cache: &ArtifactCache,
        cancel: &Cancellation,
    ) -> SkiffResult<Retrieval> {
        if !self.options.use_cache {
            debug!("Cache disabled, building all {} artifact(s)", artifacts.len());
            return Ok(Retrieval {
                needs_build: artifacts,
                resolved: vec![],
            });
        }

        let snapshot = self.fetch_snapshot(cancel).await?;

        let outcomes: Vec<SkiffResult<Outcome>> = stream::iter(artifacts)
            .map(|artifact| self.process(artifact, cache, &snapshot, cancel))
            .buffer_unordered(self.options.concurrency)
            .collect()
            .await;

        let mut retrieval = Retrieval::default();
        for outcome in outcomes {
            match outcome? {
                Outcome::Build(artifact) => retrieval.needs_build.push(artifact),
                Outcome::Resolved(result) => retrieval.resolved.push(result),
            }
        }

        sort_artifacts(&mut retrieval.needs_build);
        sort_results(&mut retrieval.resolved);
        info!(
            "Cache resolved {} artifact(s), {} need building",
            retrieval.resolved.len(),
            retrieval.needs_build.len()
        );
        Ok(retrieval)
    }

    /// Classify every artifact without retagging or pushing anything
    pub async fn classify_all(
        &self,
        artifacts: Vec<Artifact>,
        cache: &ArtifactCache,
        cancel: &Cancellation,
    ) -> SkiffResult<Vec<Classification>> {
        let snapshot = self.fetch_snapshot(cancel).await?;

        let results: Vec<SkiffResult<Classification>> = stream::iter(artifacts)
            .map(|artifact| self.classify(artifact, cache, &snapshot, cancel))
            .buffer_unordered(self.options.concurrency)
            .collect()
            .await;

        let mut classifications = results.into_iter().collect::<SkiffResult<Vec<_>>>()?;
        classifications.sort_by(|a, b| a.artifact.image_name.cmp(&b.artifact.image_name));
        Ok(classifications)
    }

    async fn process(
        &self,
        artifact: Artifact,
        cache: &ArtifactCache,
        snapshot: &ImageListSnapshot,
        cancel: &Cancellation,
    ) -> SkiffResult<Outcome> {
        let Classification {
            artifact,
            cached,
            decision,
        } = self.classify(artifact, cache, snapshot, cancel).await?;

        let details = match decision {
            Ok(details) if !details.needs_rebuild => details,
            _ => return Ok(Outcome::Build(artifact)),
        };

        match self.finalize(&artifact, &details, cached.as_ref(), cancel).await {
            Ok(result) => Ok(Outcome::Resolved(result)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                log_downgrade(&artifact.image_name, &e);
                Ok(Outcome::Build(artifact))
            }
        }
    }

    /// Hash and classify one artifact. Only cancellation is returned as `Err`.
    async fn classify(
        &self,
        mut artifact: Artifact,
        cache: &ArtifactCache,
        snapshot: &ImageListSnapshot,
        cancel: &Cancellation,
    ) -> SkiffResult<Classification> {
        let decision = self
            .retrieve_cached_artifact_details(&mut artifact, cache, snapshot, cancel)
            .await;

        let decision = match decision {
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log_downgrade(&artifact.image_name, &e);
                Err(e)
            }
            Ok(details) => Ok(details),
        };

        let cached = artifact
            .workspace_hash
            .as_deref()
            .and_then(|hash| cache.get(hash))
            .cloned();

        Ok(Classification {
            artifact,
            cached,
            decision,
        })
    }

    /// Decide what to do with one artifact.
    ///
    /// Records the computed workspace hash on `artifact`.
    pub async fn retrieve_cached_artifact_details(
        &self,
        artifact: &mut Artifact,
        cache: &ArtifactCache,
        snapshot: &ImageListSnapshot,
        cancel: &Cancellation,
    ) -> SkiffResult<CachedArtifactDetails> {
        let hash = cancel.run(self.hasher.compute_hash(artifact)).await?;
        artifact.workspace_hash = Some(hash.clone());

        let Some(details) = cache.get(&hash) else {
            debug!("Cache miss for {} ({})", artifact.image_name, hash);
            return Ok(CachedArtifactDetails::rebuild());
        };

        let tag = hash_tag(&artifact.image_name, &hash);
        if self.options.local_cluster {
            self.resolve_locally(details, tag, snapshot, cancel).await
        } else {
            self.resolve_remotely(details, tag, snapshot, cancel).await
        }
    }

    async fn resolve_locally(
        &self,
        details: &ImageDetails,
        hash_tag: String,
        snapshot: &ImageListSnapshot,
        cancel: &Cancellation,
    ) -> SkiffResult<CachedArtifactDetails> {
        let Some(daemon) = &self.daemon else {
            debug!("No local daemon for a local cluster, rebuilding {}", hash_tag);
            return Ok(CachedArtifactDetails::rebuild());
        };

        if self
            .local_tag_matches(daemon.as_ref(), &hash_tag, details, snapshot, cancel)
            .await?
        {
            debug!("Found {} in the local daemon", hash_tag);
            return Ok(CachedArtifactDetails::local_hit(hash_tag));
        }

        Self::prebuilt(details, hash_tag, snapshot, self.options.push_images)
    }

    async fn resolve_remotely(
        &self,
        details: &ImageDetails,
        hash_tag: String,
        snapshot: &ImageListSnapshot,
        cancel: &Cancellation,
    ) -> SkiffResult<CachedArtifactDetails> {
        let exists_remotely = match &self.registry {
            Some(registry) => {
                let lookup = registry.digest_exists_remotely(&hash_tag, &details.digest);
                match self.query(cancel, "registry lookup", lookup).await {
                    Ok(exists) => exists,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        debug!("Registry lookup for {} failed: {}", hash_tag, e);
                        false
                    }
                }
            }
            None => false,
        };

        if exists_remotely {
            debug!("Found {} in the registry", hash_tag);
            return Ok(CachedArtifactDetails::remote_hit(hash_tag));
        }

        if self.daemon.is_none() {
            return Ok(CachedArtifactDetails::rebuild());
        }

        Self::prebuilt(details, hash_tag, snapshot, true)
    }

    /// Whether the daemon has `hash_tag` pointing at the cached content
    async fn local_tag_matches(
        &self,
        daemon: &dyn DaemonClient,
        hash_tag: &str,
        details: &ImageDetails,
        snapshot: &ImageListSnapshot,
        cancel: &Cancellation,
    ) -> SkiffResult<bool> {
        if !self
            .query(cancel, "tag lookup", daemon.tag_exists(hash_tag))
            .await?
        {
            return Ok(false);
        }

        if let Some(image) = snapshot.find_by_tag(hash_tag) {
            return Ok(image.is_image(details));
        }

        // Tagged after the snapshot was taken
        if details.digest.is_empty() {
            let id = self
                .query(cancel, "tag lookup", daemon.resolve_tag_to_id(hash_tag))
                .await?;
            Ok(id.is_some_and(|id| same_image_id(&details.id, &id)))
        } else {
            let digest = self
                .query(cancel, "digest lookup", daemon.image_digest(hash_tag))
                .await?;
            Ok(digest.as_deref() == Some(details.digest.as_str()))
        }
    }

    fn prebuilt(
        details: &ImageDetails,
        hash_tag: String,
        snapshot: &ImageListSnapshot,
        needs_push: bool,
    ) -> SkiffResult<CachedArtifactDetails> {
        match snapshot.retrieve_prebuilt_image(details)? {
            Some(prebuilt) => {
                debug!("Found prebuilt image {} for {}", prebuilt, hash_tag);
                Ok(CachedArtifactDetails::retag(prebuilt, hash_tag, needs_push))
            }
            None => Ok(CachedArtifactDetails::rebuild()),
        }
    }

    /// Retag and push as the decision requires, then emit the build result
    async fn finalize(
        &self,
        artifact: &Artifact,
        details: &CachedArtifactDetails,
        cached: Option<&ImageDetails>,
        cancel: &Cancellation,
    ) -> SkiffResult<BuildResult> {
        if details.needs_retag {
            let daemon = self
                .daemon
                .as_ref()
                .ok_or_else(|| SkiffError::Internal("retag requested without a daemon".to_string()))?;

            info!("Retagging {} as {}", details.prebuilt_image, details.hash_tag);
            self.query(
                cancel,
                "retag",
                daemon.retag(&details.prebuilt_image, &details.hash_tag),
            )
            .await?;

            if details.needs_push {
                cancel.run(daemon.push(&details.hash_tag)).await?;
            }
        }

        let mut result = BuildResult::new(&artifact.image_name, &details.hash_tag);
        result.digest = cached
            .map(|c| c.digest.clone())
            .filter(|digest| !digest.is_empty());
        Ok(result)
    }
}

/// Ambiguity and unreachable collaborators are worth a warning, the rest is routine
fn log_downgrade(image: &str, error: &SkiffError) {
    if error.is_transient() || matches!(error, SkiffError::AmbiguousPrebuiltImage { .. }) {
        warn!("Rebuilding {}: {}", image, error);
    } else {
        info!("Rebuilding {}: {}", image, error);
    }
}
