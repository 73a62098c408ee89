//! One build run: classify, build what's left, record what was built
//!
//! Phases are strictly sequenced, so the in-memory index is only read while
//! classifying and only written after every build finished.

use crate::artifact::{sort_results, Artifact, BuildResult};
use crate::cache::{CacheRetriever, CacheStore, CacheUpdater, UpdateSummary};
use crate::cancel::Cancellation;
use crate::error::{SkiffError, SkiffResult};
use crate::orchestration::Builder;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a full run
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Every artifact's final image, sorted by image name
    pub results: Vec<BuildResult>,
    /// Image names resolved from the cache
    pub cached: Vec<String>,
    /// Image names handed to the builder
    pub built: Vec<String>,
    /// What was written back to the index
    pub update: UpdateSummary,
}

pub struct BuildPipeline {
    retriever: CacheRetriever,
    updater: CacheUpdater,
    builder: Arc<dyn Builder>,
}

impl BuildPipeline {
    pub fn new(retriever: CacheRetriever, updater: CacheUpdater, builder: Arc<dyn Builder>) -> Self {
        Self {
            retriever,
            updater,
            builder,
        }
    }

    pub async fn run(
        &self,
        artifacts: Vec<Artifact>,
        store: &mut CacheStore,
        cancel: &Cancellation,
    ) -> SkiffResult<BuildReport> {
        let retrieval = self
            .retriever
            .retrieve_cached_artifacts(artifacts, store.entries(), cancel)
            .await?;

        let mut report = BuildReport {
            cached: retrieval
                .resolved
                .iter()
                .map(|r| r.image_name.clone())
                .collect(),
            built: retrieval
                .needs_build
                .iter()
                .map(|a| a.image_name.clone())
                .collect(),
            ..BuildReport::default()
        };

        let built = if retrieval.needs_build.is_empty() {
            debug!("Nothing to build");
            vec![]
        } else {
            info!("Building {} artifact(s)", retrieval.needs_build.len());
            let built = cancel.run(self.builder.build(&retrieval.needs_build)).await?;
            if built.len() != retrieval.needs_build.len() {
                return Err(SkiffError::Internal(format!(
                    "builder returned {} results for {} artifacts",
                    built.len(),
                    retrieval.needs_build.len()
                )));
            }
            built
        };

        if self.retriever.options().use_cache && !built.is_empty() {
            report.update = self
                .updater
                .update(store, &retrieval.needs_build, &built, cancel)
                .await?;
        }

        report.results = retrieval.resolved;
        report.results.extend(built);
        sort_results(&mut report.results);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheOptions, ImageDetails, ImageSummary};
    use crate::testing::{FakeBuilder, FakeDaemon, FakeHasher};
    use std::time::Duration;
    use tempfile::TempDir;

    fn options(use_cache: bool) -> CacheOptions {
        CacheOptions {
            use_cache,
            local_cluster: true,
            push_images: false,
            concurrency: 2,
            query_timeout: Duration::from_secs(5),
        }
    }

    fn pipeline(
        use_cache: bool,
        daemon: Arc<FakeDaemon>,
        builder: Arc<FakeBuilder>,
    ) -> BuildPipeline {
        let hasher = Arc::new(FakeHasher::new(&[("web", "h-web"), ("api", "h-api")]));
        let retriever = CacheRetriever::new(options(use_cache), hasher).with_daemon(daemon.clone());
        let updater = CacheUpdater::new(true, Duration::from_secs(5)).with_daemon(daemon);
        BuildPipeline::new(retriever, updater, builder)
    }

    fn artifacts() -> Vec<Artifact> {
        vec![Artifact::new("web"), Artifact::new("api")]
    }

    #[tokio::test]
    async fn cold_run_builds_everything_and_records_it() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        let mut store = CacheStore::empty(path.clone());
        let builder = Arc::new(FakeBuilder::default());

        let report = pipeline(true, Arc::new(FakeDaemon::default()), builder.clone())
            .run(artifacts(), &mut store, &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(report.built, vec!["api", "web"]);
        assert!(report.cached.is_empty());
        assert_eq!(
            report.results,
            vec![
                BuildResult::new("api", "api:h-api").with_digest("sha256:built-api"),
                BuildResult::new("web", "web:h-web").with_digest("sha256:built-web"),
            ]
        );
        assert_eq!(report.update.updated, 2);
        assert_eq!(
            store.get("h-web"),
            Some(&ImageDetails::from_digest("sha256:built-web"))
        );
        assert_eq!(CacheStore::load(path).await.len(), 2);
    }

    #[tokio::test]
    async fn warm_run_only_builds_the_misses() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::empty(temp.path().join("cache.json"));
        store.set("h-web", ImageDetails::from_digest("sha256:web"));

        let daemon = FakeDaemon::default()
            .with_tag("web:h-web", "id-web")
            .with_image(ImageSummary {
                id: "id-web".to_string(),
                repo_tags: vec!["web:h-web".to_string()],
                repo_digests: vec!["web@sha256:web".to_string()],
            });
        let builder = Arc::new(FakeBuilder::default());

        let report = pipeline(true, Arc::new(daemon), builder.clone())
            .run(artifacts(), &mut store, &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(report.cached, vec!["web"]);
        assert_eq!(report.built, vec!["api"]);
        assert_eq!(builder.built(), vec![Artifact::new("api").with_hash("h-api")]);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[1].tag, "web:h-web");
        assert_eq!(store.get("h-web"), Some(&ImageDetails::from_digest("sha256:web")));
    }

    #[tokio::test]
    async fn disabled_cache_builds_latest_and_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        let mut store = CacheStore::empty(path.clone());
        let daemon = Arc::new(FakeDaemon::default());

        let report = pipeline(false, daemon.clone(), Arc::new(FakeBuilder::default()))
            .run(artifacts(), &mut store, &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(report.results[0].tag, "api:latest");
        assert_eq!(daemon.call_count(), 0);
        assert!(store.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn build_failure_leaves_index_untouched() {
        let temp = TempDir::new().unwrap();
        let mut store = CacheStore::empty(temp.path().join("cache.json"));

        let err = pipeline(true, Arc::new(FakeDaemon::default()), Arc::new(FakeBuilder::failing()))
            .run(artifacts(), &mut store, &Cancellation::never())
            .await
            .unwrap_err();

        assert!(matches!(err, SkiffError::ImageBuild { .. }));
        assert!(store.is_empty());
    }
}
