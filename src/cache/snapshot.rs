//! Point-in-time view of the local daemon's images
//!
//! Fetched once per run before classification. Prebuilt image lookup runs
//! against this snapshot instead of querying the daemon per artifact.

use crate::cache::store::ImageDetails;
use crate::error::{SkiffError, SkiffResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One row of the daemon's image list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    /// Daemon-assigned image ID
    pub id: String,
    /// Tags pointing at this image, in daemon order
    pub repo_tags: Vec<String>,
    /// `<repo>@<digest>` references (or bare digests)
    pub repo_digests: Vec<String>,
}

impl ImageSummary {
    /// Whether any repo digest refers to `digest`
    pub fn has_digest(&self, digest: &str) -> bool {
        !digest.is_empty()
            && self
                .repo_digests
                .iter()
                .any(|entry| digest_matches(entry, digest))
    }

    /// Whether this row is image `id` (with or without `sha256:`)
    pub fn has_id(&self, id: &str) -> bool {
        same_image_id(id, &self.id)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.repo_tags.iter().any(|t| t == tag)
    }

    /// Content identity check: digest when known, image ID otherwise
    pub fn is_image(&self, details: &ImageDetails) -> bool {
        if details.digest.is_empty() {
            self.has_id(&details.id)
        } else {
            self.has_digest(&details.digest)
        }
    }
}

fn digest_matches(entry: &str, digest: &str) -> bool {
    entry == digest
        || entry
            .rsplit_once('@')
            .is_some_and(|(_, entry_digest)| entry_digest == digest)
}

fn normalize_id(id: &str) -> &str {
    id.strip_prefix("sha256:").unwrap_or(id)
}

/// Compare image IDs, tolerating a `sha256:` prefix on either side
pub fn same_image_id(a: &str, b: &str) -> bool {
    !a.is_empty() && normalize_id(a) == normalize_id(b)
}

/// All images known to the daemon at fetch time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageListSnapshot {
    images: Vec<ImageSummary>,
}

impl ImageListSnapshot {
    pub fn new(images: Vec<ImageSummary>) -> Self {
        Self { images }
    }

    pub fn images(&self) -> &[ImageSummary] {
        &self.images
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// The row currently carrying `tag`
    pub fn find_by_tag(&self, tag: &str) -> Option<&ImageSummary> {
        self.images.iter().find(|image| image.has_tag(tag))
    }

    /// Find an existing tag whose content is identical to `details`.
    ///
    /// Matches by digest, or by image ID when the digest is empty. A single
    /// matching row yields its first tag. Several rows sharing the identity
    /// are ambiguous and fail rather than guess.
    pub fn retrieve_prebuilt_image(&self, details: &ImageDetails) -> SkiffResult<Option<String>> {
        let reference = if details.digest.is_empty() {
            details.id.as_str()
        } else {
            details.digest.as_str()
        };
        if reference.is_empty() {
            return Ok(None);
        }

        let matches: Vec<&ImageSummary> = self
            .images
            .iter()
            .filter(|image| image.is_image(details))
            .collect();

        match matches.as_slice() {
            [] => {
                debug!("No local image matches {}", reference);
                Ok(None)
            }
            [image] => {
                let tag = image.repo_tags.first().cloned();
                if tag.is_none() {
                    debug!("Local image {} matches {} but is untagged", image.id, reference);
                }
                Ok(tag)
            }
            rows => Err(SkiffError::AmbiguousPrebuiltImage {
                reference: reference.to_string(),
                count: rows.len(),
            }),
        }
    }
}
