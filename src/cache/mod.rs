//! Content-addressed image build cache
//!
//! Artifacts are keyed by a workspace hash over their build configuration
//! and dependency contents. The index maps each hash to the image identity
//! (digest, local ID) it last produced, so a later run with the same inputs
//! can reuse that image instead of rebuilding.
//!
//! # Resolution
//!
//! | Outcome | When |
//! |---------|------|
//! | Reuse | `<image>:<hash>` already exists with the cached digest |
//! | Retag | another local tag carries the cached digest |
//! | Rebuild | miss, lookup failure, or ambiguous local match |
//!
//! The index itself is only an accelerator: it may be missing or corrupt,
//! and a failed write never undoes a build.

pub mod hash;
pub mod retrieve;
pub mod snapshot;
pub mod store;
pub mod update;

pub use hash::{DependencyHasher, HashComputer};
pub use retrieve::{
    CacheOptions, CacheRetriever, CachedArtifactDetails, Classification, Retrieval,
};
pub use snapshot::{ImageListSnapshot, ImageSummary};
pub use store::{ArtifactCache, CacheStore, ImageDetails};
pub use update::{CacheUpdater, UpdateSummary};
