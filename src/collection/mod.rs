//! The box collection: a directory of installed boxes and the operations
//! over it.
//!
//! # Structure
//!
//! - `add` - Unpack, validate and install an archive
//! - `find` - Version-constrained lookup of a single box
//! - `list` - Enumeration of every installed box, and cleanup of empty names

mod add;
mod find;
mod list;

pub use add::AddOptions;
pub use list::BoxEntry;

use log::info;
use parking_lot::ReentrantMutex;
use std::path::Path;
use std::sync::Arc;

use crate::archive::Unpacker;
use crate::config::CollectionConfig;
use crate::error::Result;
use crate::layout::{Layout, validate_name};
use crate::migrate::upgrade_collection;
use crate::platform::ArchSelector;
use crate::provider::ProviderId;
use crate::runtime::Runtime;
use crate::version::{Version, VersionRequirement};

/// Rewrites stored metadata URLs before they are handed out, e.g. to add
/// credentials.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataUrlHook: Send + Sync {
    fn authenticate_box_urls(&self, urls: Vec<String>) -> anyhow::Result<Vec<String>>;
}

/// A collection of boxes stored under one root directory.
///
/// Every public operation holds the collection lock for its whole duration.
/// The lock is reentrant, so operations may call each other.
pub struct BoxCollection<R: Runtime, U: Unpacker> {
    runtime: R,
    unpacker: U,
    config: CollectionConfig,
    layout: Layout,
    lock: ReentrantMutex<()>,
    hook: Option<Arc<dyn MetadataUrlHook>>,
}

impl<R: Runtime, U: Unpacker> BoxCollection<R, U> {
    pub fn new(runtime: R, unpacker: U, config: CollectionConfig) -> Self {
        let layout = Layout::new(config.root.clone());
        Self {
            runtime,
            unpacker,
            config,
            layout,
            lock: ReentrantMutex::new(()),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn MetadataUrlHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// True if a box with exactly this name, version, one of `providers` and
    /// the selected architecture is installed.
    #[tracing::instrument(skip(self))]
    pub fn exists(
        &self,
        name: &str,
        version: &str,
        providers: &[ProviderId],
        architecture: &ArchSelector,
    ) -> Result<bool> {
        let _lock = self.lock.lock();
        validate_name(name)?;
        let version = Version::parse(version)?;
        let found = self.locate(
            name,
            providers,
            &VersionRequirement::exact(&version),
            architecture,
        )?;
        Ok(found.is_some())
    }

    /// Rebuild a collection from the unversioned layout, moving every box to
    /// version `0`. Returns the number of boxes migrated.
    #[tracing::instrument(skip(self))]
    pub fn upgrade_v1_1_to_v1_5(&self) -> Result<usize> {
        let _lock = self.lock.lock();
        let root = self.layout.root();
        if !self.runtime.is_dir(root) {
            info!("Nothing to upgrade, {:?} does not exist", root);
            return Ok(0);
        }
        upgrade_collection(&self.runtime, root, &self.config.temp_root)
    }
}
