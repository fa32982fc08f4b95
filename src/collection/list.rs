use log::{debug, info, warn};
use std::collections::HashSet;

use super::BoxCollection;
use crate::archive::Unpacker;
use crate::error::Result;
use crate::layout::{Layout, decode_name, validate_name};
use crate::provider::ProviderId;
use crate::runtime::Runtime;
use crate::version::Version;

/// One installed box as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxEntry {
    pub name: String,
    pub version: String,
    pub provider: ProviderId,
    pub architecture: Option<String>,
}

impl<R: Runtime, U: Unpacker> BoxCollection<R, U> {
    /// Every installed box, sorted by name, provider, version and
    /// architecture (untagged first).
    ///
    /// Directories that do not fit the layout are skipped. An untagged box
    /// is left out when the same box is also installed for the host
    /// architecture.
    #[tracing::instrument(skip(self))]
    pub fn all(&self) -> Result<Vec<BoxEntry>> {
        let _lock = self.lock.lock();
        let root = self.layout.root();
        if !self.runtime.is_dir(root) {
            return Ok(Vec::new());
        }

        let mut found: Vec<(Version, BoxEntry)> = Vec::new();
        for name_entry in self.runtime.read_dir(root)? {
            if !name_entry.is_dir() {
                continue;
            }
            let Some(dir_name) = name_entry.name() else {
                warn!("Skipping box directory with a non UTF-8 name: {:?}", name_entry.path);
                continue;
            };
            let name = decode_name(dir_name);

            for version_entry in self.runtime.read_dir(&name_entry.path)? {
                if !version_entry.is_dir() || version_entry.is_hidden() {
                    continue;
                }
                let Some(version) = version_entry.name().and_then(|v| Version::parse(v).ok())
                else {
                    warn!("Skipping invalid version directory {:?}", version_entry.path);
                    continue;
                };

                for child in self.runtime.read_dir(&version_entry.path)? {
                    if !child.is_dir() {
                        continue;
                    }
                    let Some(child_name) = child.name() else {
                        continue;
                    };

                    if self.runtime.is_file(&Layout::metadata_path(&child.path)) {
                        push_entry(&mut found, &name, &version, child_name, None);
                        continue;
                    }

                    for provider_entry in self.runtime.read_dir(&child.path)? {
                        if !provider_entry.is_dir()
                            || !self
                                .runtime
                                .is_file(&Layout::metadata_path(&provider_entry.path))
                        {
                            continue;
                        }
                        let Some(provider_name) = provider_entry.name() else {
                            continue;
                        };
                        push_entry(
                            &mut found,
                            &name,
                            &version,
                            provider_name,
                            Some(child_name.to_string()),
                        );
                    }
                }
            }
        }

        let host = self.config.host_architecture.as_str();
        let host_tagged: HashSet<(String, String, ProviderId)> = found
            .iter()
            .filter(|(_, e)| e.architecture.as_deref() == Some(host))
            .map(|(_, e)| (e.name.clone(), e.version.clone(), e.provider.clone()))
            .collect();
        found.retain(|(_, e)| {
            e.architecture.is_some()
                || !host_tagged.contains(&(e.name.clone(), e.version.clone(), e.provider.clone()))
        });

        found.sort_by(|(va, a), (vb, b)| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.provider.cmp(&b.provider))
                .then_with(|| va.cmp(vb))
                .then_with(|| a.architecture.cmp(&b.architecture))
        });
        Ok(found.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Remove the directory of `name` if no version of it is installed.
    ///
    /// Returns `false`, leaving everything in place, while any version
    /// remains.
    #[tracing::instrument(skip(self))]
    pub fn clean(&self, name: &str) -> Result<bool> {
        let _lock = self.lock.lock();
        validate_name(name)?;

        if self.all()?.iter().any(|entry| entry.name == name) {
            debug!("Box {} still has installed versions, keeping it", name);
            return Ok(false);
        }

        let name_dir = self.layout.name_dir(name);
        if self.runtime.exists(&name_dir) {
            info!("Removing empty box directory {:?}", name_dir);
            self.runtime.remove_dir_all(&name_dir)?;
        }
        Ok(true)
    }
}

fn push_entry(
    found: &mut Vec<(Version, BoxEntry)>,
    name: &str,
    version: &Version,
    provider: &str,
    architecture: Option<String>,
) {
    match ProviderId::parse(provider) {
        Ok(provider) => found.push((
            version.clone(),
            BoxEntry {
                name: name.to_string(),
                version: version.as_str().to_string(),
                provider,
                architecture,
            },
        )),
        Err(_) => warn!(
            "Skipping box {} version {} with invalid provider directory {:?}",
            name, version, provider
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::archive::MockUnpacker;
    use crate::artifact::BoxArtifact;
    use crate::collection::BoxCollection;
    use crate::config::CollectionConfig;
    use crate::runtime::{DirEntry, MockRuntime, RealRuntime};
    use mockall::predicate::eq;
    use std::fs;
    use std::path::PathBuf;

    fn summary(entries: &[BoxEntry]) -> Vec<(String, String, String, Option<String>)> {
        entries
            .iter()
            .map(|e| {
                (
                    e.name.clone(),
                    e.version.clone(),
                    e.provider.to_string(),
                    e.architecture.clone(),
                )
            })
            .collect()
    }

    fn row(n: &str, v: &str, p: &str, a: Option<&str>) -> (String, String, String, Option<String>) {
        (n.into(), v.into(), p.into(), a.map(String::from))
    }

    #[test]
    fn test_all_empty_or_missing_root() {
        let fixture = Fixture::new(MockUnpacker::new());
        assert!(fixture.collection.all().unwrap().is_empty());

        fs::remove_dir_all(fixture.root()).unwrap();
        assert!(fixture.collection.all().unwrap().is_empty());
    }

    #[test]
    fn test_all_sorted() {
        let fixture = Fixture::new(MockUnpacker::new());
        fixture.install("zeta/1.0/virtualbox", "virtualbox");
        fixture.install("alpha/1.10.0/virtualbox", "virtualbox");
        fixture.install("alpha/1.9.0/virtualbox", "virtualbox");
        fixture.install("alpha/1.9.0/libvirt", "libvirt");
        fixture.install("org-VAGRANTSLASH-box/2.0/arm64/libvirt", "libvirt");
        fixture.install("org-VAGRANTSLASH-box/2.0/libvirt", "libvirt");

        let entries = fixture.collection.all().unwrap();
        assert_eq!(
            summary(&entries),
            vec![
                row("alpha", "1.9.0", "libvirt", None),
                row("alpha", "1.9.0", "virtualbox", None),
                row("alpha", "1.10.0", "virtualbox", None),
                row("org/box", "2.0", "libvirt", None),
                row("org/box", "2.0", "libvirt", Some("arm64")),
                row("zeta", "1.0", "virtualbox", None),
            ]
        );
    }

    #[test]
    fn test_all_drops_untagged_duplicate_of_host_architecture() {
        let fixture = Fixture::new(MockUnpacker::new());
        fixture.install("b/1.0/virtualbox", "virtualbox");
        fixture.install("b/1.0/amd64/virtualbox", "virtualbox");
        fixture.install("b/1.0/arm64/virtualbox", "virtualbox");
        fixture.install("c/1.0/libvirt", "libvirt");
        fixture.install("c/1.0/arm64/libvirt", "libvirt");

        let entries = fixture.collection.all().unwrap();
        assert_eq!(
            summary(&entries),
            vec![
                row("b", "1.0", "virtualbox", Some("amd64")),
                row("b", "1.0", "virtualbox", Some("arm64")),
                // Only the host architecture hides the untagged copy
                row("c", "1.0", "libvirt", None),
                row("c", "1.0", "libvirt", Some("arm64")),
            ]
        );
    }

    #[test]
    fn test_all_skips_malformed_entries() {
        let fixture = Fixture::new(MockUnpacker::new());
        let root = fixture.root();
        fixture.install("good/1.0/virtualbox", "virtualbox");
        fixture.install("good/not-a-version/virtualbox", "virtualbox");
        fixture.install("good/.hidden/virtualbox", "virtualbox");
        fs::write(root.join("stray-file"), "x").unwrap();
        fs::write(root.join("good/1.5"), "x").unwrap();
        fs::write(root.join("good/1.0/README"), "x").unwrap();
        fs::create_dir_all(root.join("good/2.0/amd64/empty")).unwrap();
        fs::create_dir_all(root.join("skeleton/3.0")).unwrap();

        let entries = fixture.collection.all().unwrap();
        assert_eq!(summary(&entries), vec![row("good", "1.0", "virtualbox", None)]);
    }

    #[test]
    fn test_clean() {
        let fixture = Fixture::new(MockUnpacker::new());
        let dir = fixture.install("b/1.0/virtualbox", "virtualbox");
        let c = &fixture.collection;

        assert!(!c.clean("b").unwrap());
        assert!(dir.exists());

        let artifact = BoxArtifact::load(
            &RealRuntime,
            "b",
            "1.0",
            None,
            None,
            dir.clone(),
        )
        .unwrap();
        artifact.destroy(&RealRuntime).unwrap();
        assert!(fixture.root().join("b/1.0").is_dir());

        assert!(c.clean("b").unwrap());
        assert!(!fixture.root().join("b").exists());

        // Missing names are already clean
        assert!(c.clean("b").unwrap());
        assert!(c.clean("never/added").unwrap());
    }

    #[test]
    fn test_clean_rejects_invalid_name() {
        let fixture = Fixture::new(MockUnpacker::new());
        assert!(fixture.collection.clean("..").is_err());
        assert!(fixture.root().exists());
    }

    #[test]
    fn test_all_with_mock_runtime() {
        let mut runtime = MockRuntime::new();
        let root = PathBuf::from("/boxes");

        runtime
            .expect_is_dir()
            .with(eq(root.clone()))
            .returning(|_| true);
        runtime
            .expect_read_dir()
            .with(eq(root.clone()))
            .returning(|p| {
                Ok(vec![
                    DirEntry::dir(p.join("org-VAGRANTSLASH-box")),
                    DirEntry::file(p.join("notes.txt")),
                ])
            });
        runtime
            .expect_read_dir()
            .with(eq(root.join("org-VAGRANTSLASH-box")))
            .returning(|p| Ok(vec![DirEntry::dir(p.join("1.2.3"))]));
        runtime
            .expect_read_dir()
            .with(eq(root.join("org-VAGRANTSLASH-box/1.2.3")))
            .returning(|p| Ok(vec![DirEntry::dir(p.join("vmware_desktop"))]));
        runtime
            .expect_is_file()
            .with(eq(root.join("org-VAGRANTSLASH-box/1.2.3/vmware_desktop/metadata.json")))
            .returning(|_| true);

        let collection = BoxCollection::new(
            runtime,
            MockUnpacker::new(),
            CollectionConfig::new("/boxes", "/tmp").with_host_architecture("amd64"),
        );
        let entries = collection.all().unwrap();
        assert_eq!(
            summary(&entries),
            vec![row("org/box", "1.2.3", "vmware_desktop", None)]
        );
    }
}
