use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// Prefix for directories created while adding a box.
pub const TEMP_PREFIX: &str = "boxstore-add-temp-";

/// RAII guard for a temporary directory.
///
/// The directory is removed when the guard is dropped, whatever path led
/// there, unless ownership is taken back with [`TempDirGuard::keep`].
pub struct TempDirGuard<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
    armed: bool,
}

impl<'a, R: Runtime> TempDirGuard<'a, R> {
    /// Create a fresh temporary directory under `parent` and guard it.
    pub fn create(runtime: &'a R, parent: &Path, prefix: &str) -> anyhow::Result<Self> {
        let path = runtime.create_temp_dir(parent, prefix)?;
        debug!("Created temporary directory {:?}", path);
        Ok(Self::adopt(runtime, path))
    }

    /// Guard an existing directory.
    pub fn adopt(runtime: &'a R, path: PathBuf) -> Self {
        Self {
            runtime,
            path,
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard and hand the path back to the caller.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl<R: Runtime> Drop for TempDirGuard<'_, R> {
    fn drop(&mut self) {
        if !self.armed || !self.runtime.exists(&self.path) {
            return;
        }
        debug!("Cleaning up: {:?}", self.path);
        if let Err(e) = self.runtime.remove_dir_all(&self.path) {
            warn!("Failed to remove temporary directory {:?}: {}", self.path, e);
        }
    }
}
