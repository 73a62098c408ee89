//! Local container daemon abstraction
//!
//! The build cache only needs a handful of image queries and mutations from
//! the daemon. Implemented by [`PodmanDaemon`](super::podman::PodmanDaemon)
//! and by in-memory fakes in tests.

use crate::cache::ImageListSnapshot;
use crate::error::SkiffResult;
use async_trait::async_trait;

/// Image operations the cache needs from a local container runtime
#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// Whether `tag` names an image in the local store
    async fn tag_exists(&self, tag: &str) -> SkiffResult<bool>;

    /// Resolve `tag` to the daemon's image ID
    async fn resolve_tag_to_id(&self, tag: &str) -> SkiffResult<Option<String>>;

    /// Content digest of the image behind `tag`, if the daemon knows one
    async fn image_digest(&self, tag: &str) -> SkiffResult<Option<String>>;

    /// Enumerate every local image
    async fn list_images(&self) -> SkiffResult<ImageListSnapshot>;

    /// Point `new_tag` at the image currently tagged `old_tag`
    async fn retag(&self, old_tag: &str, new_tag: &str) -> SkiffResult<()>;

    /// Push `tag` to its registry
    async fn push(&self, tag: &str) -> SkiffResult<()>;

    /// Human-readable runtime name for display
    fn runtime_name(&self) -> &'static str;
}
