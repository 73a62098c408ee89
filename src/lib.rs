//! Skiff - content-addressed container image builds
//!
//! Fingerprints each artifact's build inputs and reuses, retags or rebuilds
//! its image depending on what the local daemon and the registry already
//! hold for that fingerprint.

pub mod artifact;
pub mod cache;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod orchestration;
pub mod pipeline;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{SkiffError, SkiffResult};
