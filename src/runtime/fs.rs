//! File system operations (read, write, directory walk, moves).

use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{DirEntry, EntryKind, RealRuntime};

impl RealRuntime {
    #[tracing::instrument(skip(self, contents))]
    pub(crate) fn write_impl(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents).context("Failed to write to file")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_to_string_impl(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).context("Failed to read file to string")
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).context("Failed to create directory")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path).context("Failed to remove directory and its contents")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn exists_impl(&self, path: &Path) -> bool {
        path.exists()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_dir_impl(&self, path: &Path) -> bool {
        path.is_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_file_impl(&self, path: &Path) -> bool {
        path.is_file()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_dir_impl(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut entries = fs::read_dir(path)
            .with_context(|| format!("Failed to read directory {:?}", path))?
            .map(|entry| {
                let path = entry?.path();
                let file_type = fs::symlink_metadata(&path)?.file_type();
                let kind = if file_type.is_symlink() {
                    EntryKind::Symlink
                } else if file_type.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                };
                Ok(DirEntry { path, kind })
            })
            .collect::<io::Result<Vec<_>>>()
            .with_context(|| format!("Failed to list directory {:?}", path))?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn move_path_impl(&self, from: &Path, to: &Path) -> Result<()> {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                debug!("Rename crosses devices, copying {:?} to {:?}", from, to);
                self.copy_recursive_impl(from, to)?;
                if is_real_dir(from) {
                    fs::remove_dir_all(from)
                } else {
                    fs::remove_file(from)
                }
                .with_context(|| format!("Failed to remove {:?} after copying", from))
            }
            Err(e) => Err(e).with_context(|| format!("Failed to move {:?} to {:?}", from, to)),
        }
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn copy_recursive_impl(&self, from: &Path, to: &Path) -> Result<()> {
        let file_type = fs::symlink_metadata(from)
            .with_context(|| format!("Failed to stat {:?}", from))?
            .file_type();
        if file_type.is_symlink() {
            copy_symlink(from, to)
                .with_context(|| format!("Failed to copy link {:?} to {:?}", from, to))?;
        } else if file_type.is_dir() {
            fs::create_dir_all(to).context("Failed to create directory")?;
            for entry in fs::read_dir(from)? {
                let entry = entry?;
                self.copy_recursive_impl(&entry.path(), &to.join(entry.file_name()))?;
            }
        } else {
            fs::copy(from, to)
                .with_context(|| format!("Failed to copy {:?} to {:?}", from, to))?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_temp_dir_impl(&self, parent: &Path, prefix: &str) -> Result<PathBuf> {
        fs::create_dir_all(parent).context("Failed to create temporary root")?;
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .context("Failed to create temporary directory")?;
        Ok(dir.keep())
    }
}

fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.is_dir())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(windows)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let target = fs::read_link(from)?;
    if fs::metadata(from).is_ok_and(|m| m.is_dir()) {
        std::os::windows::fs::symlink_dir(target, to)
    } else {
        std::os::windows::fs::symlink_file(target, to)
    }
}
