//! Error types for Skiff
//!
//! All modules use `SkiffResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Skiff operations
pub type SkiffResult<T> = Result<T, SkiffError>;

/// All errors that can occur in Skiff
#[derive(Error, Debug)]
pub enum SkiffError {
    // Environment errors
    #[error("Container daemon not found: {0}")]
    DaemonNotFound(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown artifact: {0}")]
    UnknownArtifact(String),

    // Cache errors
    #[error("Failed to hash artifact {image}: {reason}")]
    Hash { image: String, reason: String },

    #[error("Ambiguous prebuilt image: {count} local images match {reference}")]
    AmbiguousPrebuiltImage { reference: String, count: usize },

    #[error("Failed to persist cache index {path}: {reason}")]
    CachePersist { path: PathBuf, reason: String },

    // Daemon errors
    #[error("Failed to retag {from} as {to}: {reason}")]
    ImageRetag {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Image push failed: {image}: {reason}")]
    ImagePush { image: String, reason: String },

    #[error("Image build failed: {image}: {reason}")]
    ImageBuild { image: String, reason: String },

    // Registry errors
    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    #[error("Registry error for {reference}: {reason}")]
    Registry { reference: String, reason: String },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl SkiffError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a registry error
    pub fn registry(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Registry {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error aborts the run instead of degrading a single artifact
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Whether this error came from an unreachable or slow daemon/registry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Registry { .. }
                | Self::CommandFailed { .. }
                | Self::CommandExecution { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::DaemonNotFound(_) => Some("Install podman or set [daemon] binary in skiff.toml"),
            Self::AmbiguousPrebuiltImage { .. } => {
                Some("Remove duplicate local images, e.g. podman image prune")
            }
            Self::CachePersist { .. } => Some("Run: skiff cache path, and check permissions"),
            Self::UnknownArtifact(_) => Some("List artifacts under [[artifacts]] in skiff.toml"),
            _ => None,
        }
    }
}
