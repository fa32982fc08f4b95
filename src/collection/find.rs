use log::{debug, warn};
use std::path::PathBuf;

use super::BoxCollection;
use crate::archive::Unpacker;
use crate::artifact::BoxArtifact;
use crate::error::Result;
use crate::layout::{Layout, validate_name};
use crate::platform::ArchSelector;
use crate::provider::ProviderId;
use crate::runtime::Runtime;
use crate::version::{Version, VersionRequirement, VersionResolver};

impl<R: Runtime, U: Unpacker> BoxCollection<R, U> {
    /// Find the newest installed box named `name` whose version satisfies
    /// `constraint`, trying `providers` in order for each version.
    ///
    /// An empty constraint matches any version. Returns `Ok(None)` when no
    /// installed box matches.
    #[tracing::instrument(skip(self))]
    pub fn find(
        &self,
        name: &str,
        providers: &[ProviderId],
        constraint: &str,
        architecture: &ArchSelector,
    ) -> Result<Option<BoxArtifact>> {
        let _lock = self.lock.lock();
        validate_name(name)?;
        let requirement = VersionRequirement::parse(constraint)?;
        self.find_matching(name, providers, &requirement, architecture)
    }

    /// Like [`BoxCollection::locate`], with the stored metadata URL attached.
    pub(super) fn find_matching(
        &self,
        name: &str,
        providers: &[ProviderId],
        requirement: &VersionRequirement,
        architecture: &ArchSelector,
    ) -> Result<Option<BoxArtifact>> {
        let Some(artifact) = self.locate(name, providers, requirement, architecture)? else {
            return Ok(None);
        };
        let metadata_url = self.read_metadata_url(name)?;
        Ok(Some(artifact.with_metadata_url(metadata_url)))
    }

    pub(super) fn locate(
        &self,
        name: &str,
        providers: &[ProviderId],
        requirement: &VersionRequirement,
        architecture: &ArchSelector,
    ) -> Result<Option<BoxArtifact>> {
        let wanted_arch = architecture.resolve(&self.config.host_architecture)?;
        let untagged_fallback = matches!(architecture, ArchSelector::Auto);

        let name_dir = self.layout.name_dir(name);
        if !self.runtime.is_dir(&name_dir) {
            debug!("Box {} not found at {:?}", name, name_dir);
            return Ok(None);
        }

        let mut versions = Vec::new();
        for entry in self.runtime.read_dir(&name_dir)? {
            if !entry.is_dir() || entry.is_hidden() {
                continue;
            }
            let Some(dir_name) = entry.name() else {
                continue;
            };
            match Version::parse(dir_name) {
                Ok(version) => versions.push(version),
                Err(_) => warn!("Skipping invalid version directory {:?}", entry.path),
            }
        }

        for version in &VersionResolver::matching(versions, requirement) {
            for provider in providers {
                let candidates = self.provider_candidates(
                    name,
                    version,
                    provider,
                    wanted_arch.as_deref(),
                    untagged_fallback,
                );
                let Some((arch, dir)) = candidates
                    .into_iter()
                    .find(|(_, dir)| self.runtime.is_file(&Layout::metadata_path(dir)))
                else {
                    continue;
                };

                debug!("Found box {} ({}) version {} at {:?}", name, provider, version, dir);
                let artifact = BoxArtifact::load(
                    &self.runtime,
                    name,
                    version.as_str(),
                    Some(provider.clone()),
                    arch,
                    dir,
                )?;
                return Ok(Some(artifact));
            }
        }
        Ok(None)
    }

    /// Provider directories to check for one version, most specific first.
    /// The untagged layout is tried when no architecture is given or as
    /// the fallback after it.
    fn provider_candidates(
        &self,
        name: &str,
        version: &Version,
        provider: &ProviderId,
        architecture: Option<&str>,
        untagged_fallback: bool,
    ) -> Vec<(Option<String>, PathBuf)> {
        let mut candidates = Vec::with_capacity(2);
        if let Some(arch) = architecture {
            candidates.push((
                Some(arch.to_string()),
                self.layout
                    .provider_dir(name, version.as_str(), Some(arch), provider.as_str()),
            ));
        }
        if architecture.is_none() || untagged_fallback {
            candidates.push((
                None,
                self.layout
                    .provider_dir(name, version.as_str(), None, provider.as_str()),
            ));
        }
        candidates
    }

    /// The trimmed metadata URL stored for `name`, passed through the hook.
    fn read_metadata_url(&self, name: &str) -> Result<Option<String>> {
        let path = self.layout.metadata_url_path(name);
        if !self.runtime.is_file(&path) {
            return Ok(None);
        }
        let url = self.runtime.read_to_string(&path)?.trim().to_string();
        if url.is_empty() {
            return Ok(None);
        }

        match &self.hook {
            Some(hook) => {
                let urls = hook.authenticate_box_urls(vec![url])?;
                Ok(urls.into_iter().next())
            }
            None => Ok(Some(url)),
        }
    }
}
