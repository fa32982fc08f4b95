//! On-disk layout of a box collection.
//!
//! ```text
//! <root>/<encoded-name>/<version>/[<architecture>/]<provider>/metadata.json
//! <root>/<encoded-name>/metadata_url
//! ```

use std::path::{Path, PathBuf};

use crate::error::{BoxError, Result};

/// Marks a box directory as an installed provider payload.
pub const METADATA_FILE: &str = "metadata.json";

/// Sidecar holding the catalogue URL shared by every version of a box.
pub const METADATA_URL_FILE: &str = "metadata_url";

/// Token replacing `/` in directory names.
pub const SLASH_TOKEN: &str = "-VAGRANTSLASH-";

/// Token replacing `:` in directory names where colons are not allowed.
pub const COLON_TOKEN: &str = "-VAGRANTCOLON-";

/// Map a logical box name to its directory name.
pub fn encode_name(name: &str) -> String {
    let encoded = name.replace('/', SLASH_TOKEN);
    if cfg!(windows) {
        encoded.replace(':', COLON_TOKEN)
    } else {
        encoded
    }
}

/// Map a directory name back to the logical box name.
///
/// Both tokens are always decoded so collections copied between hosts stay
/// readable.
pub fn decode_name(dir_name: &str) -> String {
    dir_name.replace(SLASH_TOKEN, "/").replace(COLON_TOKEN, ":")
}

/// Reject names that cannot be stored or would not survive an
/// encode/decode round trip.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(BoxError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.trim().is_empty() {
        return invalid("name is empty");
    }
    if name == "." || name == ".." {
        return invalid("name is a relative path component");
    }
    if name.contains('\0') || name.contains('\\') {
        return invalid("name contains a reserved character");
    }
    if name.contains(SLASH_TOKEN) || name.contains(COLON_TOKEN) {
        return invalid("name contains a reserved token");
    }
    if name.split('/').any(|part| part.is_empty() || part == "..") {
        return invalid("name has an empty or parent path segment");
    }
    Ok(())
}

/// Path calculator for a collection root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns: `<root>/<encoded-name>`
    pub fn name_dir(&self, name: &str) -> PathBuf {
        self.root.join(encode_name(name))
    }

    /// Returns: `<root>/<encoded-name>/<version>`
    pub fn version_dir(&self, name: &str, version: &str) -> PathBuf {
        self.name_dir(name).join(version)
    }

    /// Returns: `<root>/<encoded-name>/<version>/[<architecture>/]<provider>`
    pub fn provider_dir(
        &self,
        name: &str,
        version: &str,
        architecture: Option<&str>,
        provider: &str,
    ) -> PathBuf {
        let mut dir = self.version_dir(name, version);
        if let Some(arch) = architecture {
            dir.push(arch);
        }
        dir.join(provider)
    }

    /// Returns: `<root>/<encoded-name>/metadata_url`
    pub fn metadata_url_path(&self, name: &str) -> PathBuf {
        self.name_dir(name).join(METADATA_URL_FILE)
    }

    /// Returns: `<dir>/metadata.json`
    pub fn metadata_path(dir: &Path) -> PathBuf {
        dir.join(METADATA_FILE)
    }
}
