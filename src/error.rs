//! Error conditions raised by the box collection.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = BoxError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BoxError {
    #[error("box '{name}' ({provider}) version {version} already exists")]
    AlreadyExists {
        name: String,
        version: String,
        provider: String,
    },

    #[error("box provider doesn't match: expected {expected}, got {actual}")]
    ProviderMismatch { expected: String, actual: String },

    #[error("failed to unpack box archive:\n{output}")]
    UnpackageFailure { output: String },

    #[error("invalid version: '{version}'")]
    InvalidVersion { version: String },

    #[error("invalid version constraint: '{constraint}'")]
    InvalidVersionConstraint { constraint: String },

    #[error("invalid box name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("invalid provider: '{provider}'")]
    InvalidProvider { provider: String },

    #[error("invalid architecture: '{architecture}'")]
    InvalidArchitecture { architecture: String },

    #[error("box metadata file not found: {}", path.display())]
    MetadataNotFound { path: PathBuf },

    #[error("box metadata file is corrupted: {}", path.display())]
    MetadataCorrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BoxError {
    /// True for the conditions a caller can recover from by retrying with
    /// different arguments.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BoxError::AlreadyExists { .. })
    }
}
