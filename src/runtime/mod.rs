//! Runtime abstraction for system operations.
//!
//! This module provides a trait-based abstraction over the filesystem and
//! process environment, so the collection logic can be exercised against a
//! mock in tests.
//!
//! # Structure
//!
//! - `env` - Environment variables and well-known directories
//! - `fs` - File system operations (read, write, directory walk, moves)

mod env;
mod fs;

use anyhow::Result;
use std::env as std_env;
use std::path::{Path, PathBuf};

/// What a directory child is. Symbolic links are never followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// One child of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }

    pub fn symlink(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Symlink,
        }
    }

    /// True only for real directories, never for links to them.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }

    /// Final path component, if it is valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Directory entries whose names start with a dot.
    pub fn is_hidden(&self) -> bool {
        self.name().is_some_and(|n| n.starts_with('.'))
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // Environment
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;

    // File System
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;

    /// List the children of a directory, sorted by path. Links are
    /// reported as [`EntryKind::Symlink`] whatever they point to.
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Move a file or directory. Falls back to copy-then-delete when the
    /// rename would cross filesystems.
    fn move_path(&self, from: &Path, to: &Path) -> Result<()>;

    /// Recursively copy a file or directory tree to `to`. Links are
    /// recreated as links, not followed.
    fn copy_recursive(&self, from: &Path, to: &Path) -> Result<()>;

    /// Create a uniquely named, empty directory under `parent`.
    /// The caller owns its removal.
    fn create_temp_dir(&self, parent: &Path, prefix: &str) -> Result<PathBuf>;

    // Directories
    fn home_dir(&self) -> Option<PathBuf>;
    fn temp_dir(&self) -> PathBuf;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.create_dir_all_impl(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.remove_dir_all_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.is_dir_impl(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.is_file_impl(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        self.read_dir_impl(path)
    }

    fn move_path(&self, from: &Path, to: &Path) -> Result<()> {
        self.move_path_impl(from, to)
    }

    fn copy_recursive(&self, from: &Path, to: &Path) -> Result<()> {
        self.copy_recursive_impl(from, to)
    }

    fn create_temp_dir(&self, parent: &Path, prefix: &str) -> Result<PathBuf> {
        self.create_temp_dir_impl(parent, prefix)
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir_impl()
    }

    fn temp_dir(&self) -> PathBuf {
        self.temp_dir_impl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_entry_helpers() {
        let entry = DirEntry::dir("/boxes/.hidden");
        assert!(entry.is_dir());
        assert!(entry.is_hidden());
        assert_eq!(entry.name(), Some(".hidden"));

        let entry = DirEntry::file("/boxes/stray.txt");
        assert!(!entry.is_dir());
        assert!(!entry.is_hidden());

        let entry = DirEntry::symlink("/boxes/shared");
        assert!(entry.is_symlink());
        assert!(!entry.is_dir());
    }
}
