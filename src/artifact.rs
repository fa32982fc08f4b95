//! A single installed (or about to be installed) box.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{BoxError, Result};
use crate::layout::Layout;
use crate::provider::ProviderId;
use crate::runtime::Runtime;

/// Contents of a box's `metadata.json`.
///
/// Only `provider` is interpreted; every other key is carried through
/// untouched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BoxMetadata {
    pub provider: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BoxMetadata {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            extra: Map::new(),
        }
    }

    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, dir: &Path) -> Result<Self> {
        let path = Layout::metadata_path(dir);
        if !runtime.is_file(&path) {
            return Err(BoxError::MetadataNotFound { path });
        }
        let content = runtime.read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|source| BoxError::MetadataCorrupted { path, source })
    }

    pub fn provider_id(&self) -> Result<ProviderId> {
        ProviderId::parse(&self.provider)
    }
}

/// Handle to one `(name, version, provider, architecture)` box.
///
/// Handles are transient views over the filesystem: the provider directory
/// and its `metadata.json` are the only record of the installation.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxArtifact {
    pub name: String,
    pub version: String,
    pub provider: ProviderId,
    pub architecture: Option<String>,
    pub directory: PathBuf,
    pub metadata: BoxMetadata,
    pub metadata_url: Option<String>,
}

impl BoxArtifact {
    /// Build a handle over `directory`, reading its metadata.
    ///
    /// When `provider` is `None` it is taken from the metadata itself, which
    /// is how a freshly unpacked archive is inspected before install.
    pub fn load<R: Runtime>(
        runtime: &R,
        name: &str,
        version: &str,
        provider: Option<ProviderId>,
        architecture: Option<String>,
        directory: PathBuf,
    ) -> Result<Self> {
        let metadata = BoxMetadata::load(runtime, &directory)?;
        let provider = match provider {
            Some(p) => p,
            None => metadata.provider_id()?,
        };

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            provider,
            architecture,
            directory,
            metadata,
            metadata_url: None,
        })
    }

    pub fn with_metadata_url(mut self, metadata_url: Option<String>) -> Self {
        self.metadata_url = metadata_url;
        self
    }

    /// Remove this box's provider directory and everything below it.
    #[tracing::instrument(skip(self, runtime), fields(name = %self.name, version = %self.version))]
    pub fn destroy<R: Runtime>(&self, runtime: &R) -> Result<()> {
        if runtime.exists(&self.directory) {
            debug!("Destroying box directory {:?}", self.directory);
            runtime.remove_dir_all(&self.directory)?;
        }
        Ok(())
    }
}
