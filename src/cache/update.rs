//! Writing freshly built images back into the index
//!
//! Updates are staged in memory and applied with a single persist per run.
//! A failed persist is only a warning: the builds already happened.

use crate::artifact::{Artifact, BuildResult};
use crate::cache::store::{CacheStore, ImageDetails};
use crate::cancel::Cancellation;
use crate::error::{SkiffError, SkiffResult};
use crate::orchestration::{DaemonClient, RegistryClient};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What an update pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Entries written into the index
    pub updated: usize,
    /// Results without a hash or a determinable digest
    pub skipped: usize,
    /// Whether the index reached disk
    pub persisted: bool,
}

/// Records `hash → {digest, id}` for newly built artifacts
pub struct CacheUpdater {
    local_cluster: bool,
    query_timeout: Duration,
    daemon: Option<Arc<dyn DaemonClient>>,
    registry: Option<Arc<dyn RegistryClient>>,
}

impl CacheUpdater {
    pub fn new(local_cluster: bool, query_timeout: Duration) -> Self {
        Self {
            local_cluster,
            query_timeout,
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

    /// Stage an entry for every built result, then persist once.
    ///
    /// `built` are the artifacts that were handed to the builder (carrying
    /// their workspace hash) and `results` what the builder produced.
    pub async fn update(
        &self,
        store: &mut CacheStore,
        built: &[Artifact],
        results: &[BuildResult],
        cancel: &Cancellation,
    ) -> SkiffResult<UpdateSummary> {
        // Keyed by the tag the builder was asked to produce
        let hashes: HashMap<String, &str> = built
            .iter()
            .filter_map(|a| Some((a.hash_tag()?, a.workspace_hash.as_deref()?)))
            .collect();

        let mut staged = store.entries().clone();
        let mut summary = UpdateSummary::default();

        for result in results {
            let Some(hash) = hashes.get(&result.tag) else {
                debug!("No workspace hash for {}, not caching", result.tag);
                summary.skipped += 1;
                continue;
            };

            match self.image_details(result, cancel).await {
                Ok(Some(details)) => {
                    debug!("Caching {} -> {}", hash, details.digest);
                    staged.insert(hash.to_string(), details);
                    summary.updated += 1;
                }
                Ok(None) => {
                    warn!("Could not determine digest of {}, not caching", result.tag);
                    summary.skipped += 1;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Could not inspect {}, not caching: {}", result.tag, e);
                    summary.skipped += 1;
                }
            }
        }

        if summary.updated == 0 {
            return Ok(summary);
        }

        // Nothing is applied if we were cancelled while staging
        cancel.check()?;
        store.replace(staged);

        match store.persist().await {
            Ok(()) => summary.persisted = true,
            Err(e) => warn!("{}", persist_warning(&e)),
        }
        Ok(summary)
    }

    async fn image_details(
        &self,
        result: &BuildResult,
        cancel: &Cancellation,
    ) -> SkiffResult<Option<ImageDetails>> {
        // A push may recompress layers, so the registry's digest wins over
        // whatever the builder read locally
        let digest = match self.registry_digest(&result.tag, cancel).await? {
            Some(digest) => Some(digest),
            None => match result.digest.clone().filter(|d| !d.is_empty()) {
                Some(digest) => Some(digest),
                None => self.local_digest(&result.tag, cancel).await?,
            },
        };

        let id = match &self.daemon {
            Some(daemon) => self
                .query(cancel, "tag lookup", daemon.resolve_tag_to_id(&result.tag))
                .await
                .unwrap_or_else(|e| {
                    debug!("No local id for {}: {}", result.tag, e);
                    None
                }),
            None => None,
        };
        cancel.check()?;

        match (digest, id) {
            (None, None) => Ok(None),
            (digest, id) => Ok(Some(ImageDetails::new(
                digest.unwrap_or_default(),
                id.unwrap_or_default(),
            ))),
        }
    }

    /// Digest the registry serves for `tag`, on remote clusters only
    async fn registry_digest(&self, tag: &str, cancel: &Cancellation) -> SkiffResult<Option<String>> {
        let Some(registry) = self.registry.as_ref().filter(|_| !self.local_cluster) else {
            return Ok(None);
        };

        match self
            .query(cancel, "registry lookup", registry.remote_digest(tag))
            .await
        {
            Ok(digest) => Ok(digest.filter(|d| !d.is_empty())),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!("Registry has no digest for {}: {}", tag, e);
                Ok(None)
            }
        }
    }

    async fn local_digest(&self, tag: &str, cancel: &Cancellation) -> SkiffResult<Option<String>> {
        match &self.daemon {
            Some(daemon) => {
                self.query(cancel, "digest lookup", daemon.image_digest(tag))
                    .await
            }
            None => Ok(None),
        }
    }

    async fn query<T, F>(&self, cancel: &Cancellation, operation: &str, fut: F) -> SkiffResult<T>
    where
        F: std::future::Future<Output = SkiffResult<T>>,
    {
        cancel.run_with_timeout(operation, self.query_timeout, fut).await
    }
}

impl std::fmt::Debug for CacheUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheUpdater")
            .field("local_cluster", &self.local_cluster)
            .field("daemon", &self.daemon.as_ref().map(|d| d.runtime_name()))
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

/// Turn a persist error into the user-facing warning text
pub fn persist_warning(err: &SkiffError) -> String {
    match err.hint() {
        Some(hint) => format!("{} ({})", err, hint),
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel;
    use crate::testing::{FakeDaemon, FakeRegistry};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn updater(local_cluster: bool) -> CacheUpdater {
        CacheUpdater::new(local_cluster, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn builder_digest_is_recorded_and_persisted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        let mut store = CacheStore::empty(path.clone());

        let daemon = FakeDaemon::default().with_tag("web:h1", "sha256:id1");
        let summary = updater(true)
            .with_daemon(Arc::new(daemon))
            .update(
                &mut store,
                &[Artifact::new("web").with_hash("h1")],
                &[BuildResult::new("web", "web:h1").with_digest("sha256:d1")],
                &Cancellation::never(),
            )
            .await
            .unwrap();

        assert_eq!(
            summary,
            UpdateSummary {
                updated: 1,
                skipped: 0,
                persisted: true
            }
        );
        assert_eq!(store.get("h1"), Some(&ImageDetails::new("sha256:d1", "sha256:id1")));

        let reloaded = CacheStore::load(path).await;
        assert_eq!(reloaded.entries(), store.entries());
    }

    #[tokio::test]
    async fn local_cluster_asks_daemon_for_digest() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::empty(temp.path().join("cache.json"));
        let daemon = FakeDaemon::default()
            .with_tag("web:h1", "id1")
            .with_digest("web:h1", "sha256:local");

        let summary = updater(true)
            .with_daemon(Arc::new(daemon))
            .update(
                &mut store,
                &[Artifact::new("web").with_hash("h1")],
                &[BuildResult::new("web", "web:h1")],
                &Cancellation::never(),
            )
            .await
            .unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(store.get("h1"), Some(&ImageDetails::new("sha256:local", "id1")));
    }

    #[tokio::test]
    async fn remote_cluster_asks_registry_for_digest() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::empty(temp.path().join("cache.json"));
        let registry = FakeRegistry::default().with_digest("web:h1", "sha256:remote");

        updater(false)
            .with_registry(Arc::new(registry))
            .update(
                &mut store,
                &[Artifact::new("web").with_hash("h1")],
                &[BuildResult::new("web", "web:h1")],
                &Cancellation::never(),
            )
            .await
            .unwrap();

        assert_eq!(store.get("h1"), Some(&ImageDetails::from_digest("sha256:remote")));
    }

    #[tokio::test]
    async fn remote_cluster_prefers_pushed_digest_over_local() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::empty(temp.path().join("cache.json"));
        let registry = FakeRegistry::default().with_digest("web:h1", "sha256:pushed");

        updater(false)
            .with_registry(Arc::new(registry))
            .update(
                &mut store,
                &[Artifact::new("web").with_hash("h1")],
                &[BuildResult::new("web", "web:h1").with_digest("sha256:local")],
                &Cancellation::never(),
            )
            .await
            .unwrap();

        assert_eq!(store.get("h1"), Some(&ImageDetails::from_digest("sha256:pushed")));
    }

    #[tokio::test]
    async fn unreachable_registry_keeps_builder_digest() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::empty(temp.path().join("cache.json"));

        updater(false)
            .with_registry(Arc::new(FakeRegistry::failing()))
            .update(
                &mut store,
                &[Artifact::new("web").with_hash("h1")],
                &[BuildResult::new("web", "web:h1").with_digest("sha256:local")],
                &Cancellation::never(),
            )
            .await
            .unwrap();

        assert_eq!(store.get("h1"), Some(&ImageDetails::from_digest("sha256:local")));
    }

    #[tokio::test]
    async fn same_image_with_two_hashes_keeps_both() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::empty(temp.path().join("cache.json"));

        let summary = updater(true)
            .update(
                &mut store,
                &[
                    Artifact::new("web").with_hash("h1"),
                    Artifact::new("web").with_hash("h2"),
                ],
                &[
                    BuildResult::new("web", "web:h2").with_digest("sha256:from-h2"),
                    BuildResult::new("web", "web:h1").with_digest("sha256:from-h1"),
                ],
                &Cancellation::never(),
            )
            .await
            .unwrap();

        assert_eq!(summary.updated, 2);
        assert_eq!(store.get("h1"), Some(&ImageDetails::from_digest("sha256:from-h1")));
        assert_eq!(store.get("h2"), Some(&ImageDetails::from_digest("sha256:from-h2")));
    }

    #[tokio::test]
    async fn unknown_digest_is_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        let mut store = CacheStore::empty(path.clone());

        let summary = updater(true)
            .update(
                &mut store,
                &[Artifact::new("web").with_hash("h1")],
                &[BuildResult::new("web", "web:h1")],
                &Cancellation::never(),
            )
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert!(store.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn unhashed_results_are_not_cached() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::empty(temp.path().join("cache.json"));

        let summary = updater(true)
            .update(
                &mut store,
                &[Artifact::new("web")],
                &[BuildResult::new("web", "web:latest").with_digest("sha256:d")],
                &Cancellation::never(),
            )
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn existing_entries_are_kept_and_replaced_whole() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::empty(temp.path().join("cache.json"));
        store.set("old", ImageDetails::from_digest("sha256:old"));
        store.set("h1", ImageDetails::new("sha256:stale", "stale-id"));

        updater(true)
            .update(
                &mut store,
                &[
                    Artifact::new("api").with_hash("h2"),
                    Artifact::new("web").with_hash("h1"),
                ],
                &[
                    BuildResult::new("web", "web:h1").with_digest("sha256:new"),
                    BuildResult::new("api", "api:h2").with_digest("sha256:api"),
                ],
                &Cancellation::never(),
            )
            .await
            .unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("h1"), Some(&ImageDetails::from_digest("sha256:new")));
        assert_eq!(store.get("old"), Some(&ImageDetails::from_digest("sha256:old")));
    }

    #[tokio::test]
    async fn persist_failure_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let mut store = CacheStore::empty(blocker.join("cache.json"));

        let summary = updater(true)
            .update(
                &mut store,
                &[Artifact::new("web").with_hash("h1")],
                &[BuildResult::new("web", "web:h1").with_digest("sha256:d1")],
                &Cancellation::never(),
            )
            .await
            .unwrap();

        assert_eq!(summary.updated, 1);
        assert!(!summary.persisted);
    }

    #[tokio::test]
    async fn cancelled_update_applies_nothing() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::empty(temp.path().join("cache.json"));
        let (handle, signal) = cancel::channel();
        handle.cancel("interrupted");

        let err = updater(true)
            .with_daemon(Arc::new(FakeDaemon::default()))
            .update(
                &mut store,
                &[Artifact::new("web").with_hash("h1")],
                &[BuildResult::new("web", "web:h1").with_digest("sha256:d1")],
                &signal,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SkiffError::Cancelled(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn persist_warning_includes_hint() {
        let err = SkiffError::CachePersist {
            path: PathBuf::from("/x/cache.json"),
            reason: "denied".to_string(),
        };
        let text = persist_warning(&err);
        assert!(text.contains("/x/cache.json"));
        assert!(text.contains('('));
    }
}
