use anyhow::anyhow;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::slice;

use super::BoxCollection;
use crate::archive::Unpacker;
use crate::artifact::BoxArtifact;
use crate::cleanup::{TEMP_PREFIX, TempDirGuard};
use crate::error::{BoxError, Result};
use crate::layout::validate_name;
use crate::migrate::{is_v1_box, upgrade_v1_dir};
use crate::platform::ArchSelector;
use crate::provider::ProviderId;
use crate::runtime::Runtime;
use crate::version::{Version, VersionRequirement};

/// Options for [`BoxCollection::add`].
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Providers the archive is expected to contain. When set, the archive's
    /// own provider must be one of them.
    pub providers: Option<Vec<ProviderId>>,
    /// Architecture directory to install under. `None` installs without one.
    pub architecture: Option<ArchSelector>,
    /// Replace an existing box with the same name, version and provider.
    pub force: bool,
    /// Catalogue URL to record for the box name.
    pub metadata_url: Option<String>,
}

impl<R: Runtime, U: Unpacker> BoxCollection<R, U> {
    /// Unpack `archive` and install it as `name` at `version`.
    ///
    /// Returns the installed box as [`BoxCollection::find`] sees it.
    #[tracing::instrument(skip(self, options))]
    pub fn add(
        &self,
        archive: &Path,
        name: &str,
        version: &str,
        options: &AddOptions,
    ) -> Result<BoxArtifact> {
        let _lock = self.lock.lock();

        validate_name(name)?;
        let version = Version::parse(version)?;
        let architecture = match &options.architecture {
            Some(selector) => selector.resolve(&self.config.host_architecture)?,
            None => None,
        };
        let selector = match &architecture {
            Some(arch) => ArchSelector::Named(arch.clone()),
            None => ArchSelector::Unset,
        };

        if let Some(providers) = &options.providers {
            self.check_box_exists(name, &version, providers, &selector, options.force)?;
        }

        let extraction = TempDirGuard::create(&self.runtime, &self.config.temp_root, TEMP_PREFIX)?;
        info!("Unpacking {:?} into {:?}", archive, extraction.path());
        self.unpacker.unpack(archive, extraction.path())?;

        let upgraded = if is_v1_box(&self.runtime, extraction.path()) {
            debug!("Added box is a V1 box, upgrading in place");
            Some(upgrade_v1_dir(
                &self.runtime,
                extraction.path(),
                &self.config.temp_root,
            )?)
        } else {
            None
        };
        let payload_dir = upgraded
            .as_ref()
            .map_or(extraction.path(), |guard| guard.path())
            .to_path_buf();

        let staged = BoxArtifact::load(
            &self.runtime,
            name,
            version.as_str(),
            None,
            architecture.clone(),
            payload_dir.clone(),
        )?;
        let provider = staged.provider;

        match &options.providers {
            Some(providers) => {
                if !providers.contains(&provider) {
                    return Err(BoxError::ProviderMismatch {
                        expected: ProviderId::join(providers),
                        actual: provider.to_string(),
                    });
                }
            }
            None => self.check_box_exists(
                name,
                &version,
                slice::from_ref(&provider),
                &selector,
                options.force,
            )?,
        }

        let provider_dir = self.layout.provider_dir(
            name,
            version.as_str(),
            architecture.as_deref(),
            provider.as_str(),
        );
        if self.runtime.exists(&provider_dir) {
            debug!("Removing previous box directory {:?}", provider_dir);
            self.runtime.remove_dir_all(&provider_dir)?;
        }
        self.runtime.create_dir_all(&provider_dir)?;

        info!("Installing box {} ({}) into {:?}", name, provider, provider_dir);
        self.move_tree(&payload_dir, &provider_dir)?;

        if let Some(url) = &options.metadata_url {
            let path = self.layout.metadata_url_path(name);
            debug!("Writing metadata URL to {:?}", path);
            self.runtime.write(&path, url.as_bytes())?;
        }

        // Temp trees are removed before the lookup so a failed lookup
        // leaves nothing behind in the temp root.
        drop(upgraded);
        drop(extraction);

        self.find_matching(
            name,
            slice::from_ref(&provider),
            &VersionRequirement::exact(&version),
            &selector,
        )?
        .ok_or_else(|| {
            anyhow!(
                "Box {} ({}) version {} is missing after install",
                name,
                provider,
                version
            )
            .into()
        })
    }

    /// Fail if the box is installed, unless `force` allows replacing it.
    fn check_box_exists(
        &self,
        name: &str,
        version: &Version,
        providers: &[ProviderId],
        architecture: &ArchSelector,
        force: bool,
    ) -> Result<()> {
        let requirement = VersionRequirement::exact(version);
        let Some(existing) = self.locate(name, providers, &requirement, architecture)? else {
            return Ok(());
        };

        if !force {
            return Err(BoxError::AlreadyExists {
                name: existing.name,
                version: existing.version,
                provider: existing.provider.to_string(),
            });
        }

        info!(
            "Replacing box {} ({}) version {}",
            existing.name, existing.provider, existing.version
        );
        existing.destroy(&self.runtime)
    }

    /// Move every file below `from` into `to`, recreating directories one
    /// level at a time. `from` itself stays in place. Symbolic links are
    /// moved as links and never descended into.
    fn move_tree(&self, from: &Path, to: &Path) -> Result<()> {
        let mut pending: Vec<(PathBuf, PathBuf)> = vec![(from.to_path_buf(), to.to_path_buf())];

        while let Some((src_dir, dest_dir)) = pending.pop() {
            for entry in self.runtime.read_dir(&src_dir)? {
                let Some(file_name) = entry.path.file_name() else {
                    continue;
                };
                let dest = dest_dir.join(file_name);
                if entry.is_dir() {
                    self.runtime.create_dir_all(&dest)?;
                    pending.push((entry.path, dest));
                } else {
                    debug!("Moving {:?} to {:?}", entry.path, dest);
                    self.runtime.move_path(&entry.path, &dest)?;
                }
            }
        }
        Ok(())
    }
}
