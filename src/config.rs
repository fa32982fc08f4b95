use anyhow::Context;
use log::{debug, info};
use std::path::PathBuf;

use crate::error::Result;
use crate::platform::{host_architecture, validate_architecture};
use crate::runtime::Runtime;

pub const ROOT_ENV: &str = "BOXSTORE_ROOT";
pub const TMP_ENV: &str = "BOXSTORE_TMP";
pub const ARCH_ENV: &str = "BOXSTORE_ARCH";

/// Where a collection lives and how it sees its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    /// Collection root holding one directory per box name.
    pub root: PathBuf,
    /// Parent directory for unpack and migration scratch space.
    pub temp_root: PathBuf,
    /// Architecture preferred by lookups with `ArchSelector::Auto`.
    pub host_architecture: String,
}

impl CollectionConfig {
    pub fn new(root: impl Into<PathBuf>, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            temp_root: temp_root.into(),
            host_architecture: host_architecture(),
        }
    }

    pub fn with_host_architecture(mut self, arch: impl Into<String>) -> Self {
        self.host_architecture = arch.into();
        self
    }

    /// Resolve the configuration from an explicit root and the environment.
    #[tracing::instrument(skip(runtime))]
    pub fn resolve<R: Runtime>(runtime: &R, root_override: Option<PathBuf>) -> Result<Self> {
        let root = match root_override {
            Some(path) => path,
            None => match non_empty_var(runtime, ROOT_ENV) {
                Some(path) => PathBuf::from(path),
                None => default_root(runtime)?,
            },
        };
        info!("Using collection root: {}", root.display());

        let temp_root = non_empty_var(runtime, TMP_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| runtime.temp_dir());

        let host_architecture = non_empty_var(runtime, ARCH_ENV).unwrap_or_else(host_architecture);
        validate_architecture(&host_architecture)?;
        debug!(
            "Temporary root: {}, host architecture: {}",
            temp_root.display(),
            host_architecture
        );

        Ok(Self {
            root,
            temp_root,
            host_architecture,
        })
    }
}

/// Default collection root: `~/.boxstore/boxes`.
#[tracing::instrument(skip(runtime))]
pub fn default_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    let home_dir = runtime
        .home_dir()
        .context("Could not find home directory")?;
    Ok(home_dir.join(".boxstore").join("boxes"))
}

fn non_empty_var<R: Runtime>(runtime: &R, key: &str) -> Option<String> {
    runtime
        .env_var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
