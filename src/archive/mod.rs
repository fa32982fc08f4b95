use log::debug;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use crate::error::{BoxError, Result};

/// Extracts a box archive into a directory.
#[cfg_attr(test, mockall::automock)]
pub trait Unpacker: Send + Sync {
    /// Extract `archive` into the existing directory `extract_to`.
    fn unpack(&self, archive: &Path, extract_to: &Path) -> Result<()>;
}

/// Unpacker shelling out to `bsdtar`.
///
/// Ownership and permission bits are not restored and a leading `./` is
/// stripped from every member path, so only the content of the archive
/// ends up on disk.
#[derive(Debug, Clone)]
pub struct BsdtarUnpacker {
    program: OsString,
}

impl Default for BsdtarUnpacker {
    fn default() -> Self {
        Self::new()
    }
}

impl BsdtarUnpacker {
    pub fn new() -> Self {
        Self::with_program("bsdtar")
    }

    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn args(archive: &Path, extract_to: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--no-same-owner",
            "--no-same-permissions",
            "-v",
            "-x",
            "-m",
            "-s",
            "|^\\./||",
            "-C",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(extract_to.as_os_str().to_owned());
        args.push("-f".into());
        args.push(archive.as_os_str().to_owned());
        args
    }
}

impl Unpacker for BsdtarUnpacker {
    #[tracing::instrument(skip(self))]
    fn unpack(&self, archive: &Path, extract_to: &Path) -> Result<()> {
        debug!("Unpacking {:?} into {:?}", archive, extract_to);
        let output = Command::new(&self.program)
            .args(Self::args(archive, extract_to))
            .output()
            .map_err(|e| BoxError::UnpackageFailure {
                output: format!("failed to run {:?}: {}", self.program, e),
            })?;

        if !output.status.success() {
            return Err(BoxError::UnpackageFailure {
                output: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}
