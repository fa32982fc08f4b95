//! Host architecture detection and architecture selection.

use crate::error::{BoxError, Result};

/// Architecture of the running host, named the way box catalogues name it.
pub fn host_architecture() -> String {
    #[cfg(target_arch = "x86_64")]
    {
        "amd64".to_string()
    }
    #[cfg(target_arch = "x86")]
    {
        "i386".to_string()
    }
    #[cfg(target_arch = "aarch64")]
    {
        "arm64".to_string()
    }
    #[cfg(target_arch = "arm")]
    {
        "arm".to_string()
    }
    #[cfg(all(target_arch = "powerpc64", target_endian = "little"))]
    {
        "ppc64le".to_string()
    }
    #[cfg(all(target_arch = "powerpc64", target_endian = "big"))]
    {
        "ppc64".to_string()
    }
    #[cfg(not(any(
        target_arch = "x86_64",
        target_arch = "x86",
        target_arch = "aarch64",
        target_arch = "arm",
        target_arch = "powerpc64"
    )))]
    {
        std::env::consts::ARCH.to_string()
    }
}

/// Which architecture layer a lookup or install targets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArchSelector {
    /// The host architecture, falling back to the untagged layout on lookup.
    #[default]
    Auto,
    /// Exactly this architecture directory.
    Named(String),
    /// Only the untagged layout (`<version>/<provider>`).
    Unset,
}

/// Check that `name` can be used as a single directory component.
///
/// Same token rules as provider names: not empty, not `.` or `..`, and no
/// whitespace, path separators or NUL.
pub fn validate_architecture(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c == '/' || c == '\\' || c == '\0');
    if !valid {
        return Err(BoxError::InvalidArchitecture {
            architecture: name.to_string(),
        });
    }
    Ok(())
}

impl ArchSelector {
    /// Parse `auto` or an architecture name.
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim() {
            "" | "auto" => Ok(ArchSelector::Auto),
            name => {
                validate_architecture(name)?;
                Ok(ArchSelector::Named(name.to_string()))
            }
        }
    }

    /// The concrete architecture directory for this selector, if any.
    /// Fails when the name cannot be a directory component.
    pub fn resolve(&self, host: &str) -> Result<Option<String>> {
        let arch = match self {
            ArchSelector::Auto => host,
            ArchSelector::Named(name) => name,
            ArchSelector::Unset => return Ok(None),
        };
        validate_architecture(arch)?;
        Ok(Some(arch.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_architecture() {
        let arch = host_architecture();
        assert!(!arch.is_empty());

        #[cfg(target_arch = "x86_64")]
        assert_eq!(arch, "amd64");

        #[cfg(target_arch = "aarch64")]
        assert_eq!(arch, "arm64");
    }

    #[test]
    fn test_parse_selector() {
        assert_eq!(ArchSelector::parse("auto").unwrap(), ArchSelector::Auto);
        assert_eq!(ArchSelector::parse("").unwrap(), ArchSelector::Auto);
        assert_eq!(
            ArchSelector::parse(" arm64 ").unwrap(),
            ArchSelector::Named("arm64".into())
        );
    }

    #[test]
    fn test_parse_selector_rejects_path_components() {
        for input in ["..", ".", "../../victim", "a/b", "a\\b", "x86 64", "nul\0"] {
            let err = ArchSelector::parse(input).unwrap_err();
            assert!(
                matches!(err, BoxError::InvalidArchitecture { .. }),
                "{input:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_validate_architecture() {
        assert!(validate_architecture("ppc64le").is_ok());
        assert!(validate_architecture("x86_64").is_ok());
        assert!(validate_architecture("").is_err());
        assert!(validate_architecture("../etc").is_err());
    }

    #[test]
    fn test_resolve_selector() {
        assert_eq!(
            ArchSelector::Auto.resolve("amd64").unwrap(),
            Some("amd64".into())
        );
        assert_eq!(
            ArchSelector::Named("arm64".into()).resolve("amd64").unwrap(),
            Some("arm64".into())
        );
        assert_eq!(ArchSelector::Unset.resolve("amd64").unwrap(), None);
    }

    #[test]
    fn test_resolve_selector_rejects_traversal() {
        let named = ArchSelector::Named("../../../victim".into());
        assert!(matches!(
            named.resolve("amd64"),
            Err(BoxError::InvalidArchitecture { .. })
        ));
        assert!(ArchSelector::Auto.resolve("..").is_err());
        // Unset never touches a directory name
        assert_eq!(ArchSelector::Unset.resolve("..").unwrap(), None);
    }
}
