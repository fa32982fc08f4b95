//! Upgrades of legacy box layouts.
//!
//! A V1 box is a single-provider tree without `metadata.json`, recognised by
//! the `box.ovf` descriptor at its root. Collections from before versioning
//! store providers directly below the box name: `<root>/<name>/<provider>`.

use anyhow::{Context, anyhow};
use log::{debug, info, warn};
use std::path::Path;

use crate::artifact::BoxMetadata;
use crate::cleanup::{TEMP_PREFIX, TempDirGuard};
use crate::error::Result;
use crate::layout::{Layout, encode_name};
use crate::runtime::Runtime;

/// Descriptor file present at the root of every V1 box.
pub const V1_DESCRIPTOR: &str = "box.ovf";

/// Provider assumed for V1 boxes, which predate multi-provider support.
pub const V1_DEFAULT_PROVIDER: &str = "virtualbox";

/// Version assigned to boxes migrated from the unversioned layout.
pub const UNVERSIONED_VERSION: &str = "0";

pub fn is_v1_box<R: Runtime>(runtime: &R, dir: &Path) -> bool {
    runtime.is_file(&dir.join(V1_DESCRIPTOR))
}

/// Write a default `metadata.json` into `dir` unless one is present.
fn ensure_metadata<R: Runtime>(runtime: &R, dir: &Path) -> Result<()> {
    let path = Layout::metadata_path(dir);
    if runtime.is_file(&path) {
        return Ok(());
    }
    let content = serde_json::to_string(&BoxMetadata::new(V1_DEFAULT_PROVIDER))
        .context("Failed to serialize box metadata")?;
    runtime.write(&path, content.as_bytes())?;
    Ok(())
}

/// Move the contents of the V1 box at `dir` into a new temporary directory
/// under `temp_root` and give it a `metadata.json`.
///
/// The returned guard owns the upgraded tree.
#[tracing::instrument(skip(runtime))]
pub fn upgrade_v1_dir<'a, R: Runtime>(
    runtime: &'a R,
    dir: &Path,
    temp_root: &Path,
) -> Result<TempDirGuard<'a, R>> {
    debug!("Upgrading box in directory: {:?}", dir);
    let temp = TempDirGuard::create(runtime, temp_root, TEMP_PREFIX)?;
    debug!("Temporary directory for upgrading: {:?}", temp.path());

    for entry in runtime.read_dir(dir)? {
        if entry.path == temp.path() {
            continue;
        }
        let Some(file_name) = entry.path.file_name() else {
            continue;
        };
        debug!("Moving to upgrade directory: {:?}", entry.path);
        runtime.move_path(&entry.path, &temp.path().join(file_name))?;
    }

    ensure_metadata(runtime, temp.path())?;
    Ok(temp)
}

/// Rebuild an unversioned collection as `<root>/<encoded-name>/0/<provider>`.
///
/// The new tree is staged under `temp_root` and swapped in only after every
/// box has been copied, so a failure before the swap leaves `root` as it
/// was. Returns the number of boxes migrated.
#[tracing::instrument(skip(runtime))]
pub fn upgrade_collection<R: Runtime>(runtime: &R, root: &Path, temp_root: &Path) -> Result<usize> {
    let staging = TempDirGuard::create(runtime, temp_root, TEMP_PREFIX)?;
    if staging.path().starts_with(root) {
        return Err(anyhow!(
            "Temporary directory {:?} must not be inside the collection root {:?}",
            staging.path(),
            root
        )
        .into());
    }

    let mut migrated = 0;
    for box_dir in runtime.read_dir(root)? {
        if box_dir.is_symlink() {
            warn!("Skipping linked box directory {:?}", box_dir.path);
            continue;
        }
        if !box_dir.is_dir() {
            continue;
        }
        let Some(box_name) = box_dir.name() else {
            warn!("Skipping box directory with a non UTF-8 name: {:?}", box_dir.path);
            continue;
        };

        let new_box_dir = staging
            .path()
            .join(encode_name(box_name))
            .join(UNVERSIONED_VERSION);

        if is_v1_box(runtime, &box_dir.path) {
            debug!("Upgrading V1 box: {}", box_name);
            let provider_dir = new_box_dir.join(V1_DEFAULT_PROVIDER);
            runtime.copy_recursive(&box_dir.path, &provider_dir)?;
            ensure_metadata(runtime, &provider_dir)?;
        } else {
            runtime.create_dir_all(&new_box_dir)?;
            for provider_dir in runtime.read_dir(&box_dir.path)? {
                let Some(file_name) = provider_dir.path.file_name() else {
                    continue;
                };
                runtime.copy_recursive(&provider_dir.path, &new_box_dir.join(file_name))?;
            }
        }
        migrated += 1;
    }

    // From here on the staged tree is the only complete copy.
    let staged = staging.keep();
    runtime.remove_dir_all(root)?;
    runtime
        .move_path(&staged, root)
        .with_context(|| format!("Upgraded collection left at {:?}", staged))?;

    info!("Upgraded {} box(es) in {:?}", migrated, root);
    Ok(migrated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{DirEntry, MockRuntime, RealRuntime};
    use mockall::predicate::eq;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_is_v1_box() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_is_file()
            .with(eq(PathBuf::from("/old/box.ovf")))
            .returning(|_| true);
        runtime
            .expect_is_file()
            .with(eq(PathBuf::from("/new/box.ovf")))
            .returning(|_| false);

        assert!(is_v1_box(&runtime, Path::new("/old")));
        assert!(!is_v1_box(&runtime, Path::new("/new")));
    }

    #[test]
    fn test_upgrade_v1_dir_moves_children_and_writes_metadata() {
        let mut runtime = MockRuntime::new();
        let dir = PathBuf::from("/unpacked");
        let temp_root = PathBuf::from("/tmp");
        let upgraded = PathBuf::from("/tmp/boxstore-add-temp-1");

        let upgraded_clone = upgraded.clone();
        runtime
            .expect_create_temp_dir()
            .returning(move |_, _| Ok(upgraded_clone.clone()));
        runtime
            .expect_read_dir()
            .with(eq(dir.clone()))
            .returning(|p| {
                Ok(vec![
                    DirEntry::file(p.join("box.ovf")),
                    DirEntry::file(p.join("box-disk1.vmdk")),
                    DirEntry::dir(p.join("include")),
                ])
            });
        for name in ["box.ovf", "box-disk1.vmdk", "include"] {
            runtime
                .expect_move_path()
                .with(eq(dir.join(name)), eq(upgraded.join(name)))
                .times(1)
                .returning(|_, _| Ok(()));
        }
        runtime
            .expect_is_file()
            .with(eq(upgraded.join("metadata.json")))
            .returning(|_| false);
        runtime
            .expect_write()
            .withf(|path, contents| {
                path == Path::new("/tmp/boxstore-add-temp-1/metadata.json")
                    && contents == br#"{"provider":"virtualbox"}"#
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let guard = upgrade_v1_dir(&runtime, &dir, &temp_root).unwrap();
        assert_eq!(guard.keep(), upgraded);
    }

    #[test]
    fn test_upgrade_v1_dir_on_disk() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let v1 = dir.path().join("v1");
        fs::create_dir_all(v1.join("nested")).unwrap();
        fs::write(v1.join("box.ovf"), "<ovf/>").unwrap();
        fs::write(v1.join("Vagrantfile"), "# vagrantfile").unwrap();
        fs::write(v1.join("nested/disk.vmdk"), "disk").unwrap();

        let guard = upgrade_v1_dir(&runtime, &v1, &dir.path().join("tmp")).unwrap();
        let upgraded = guard.path().to_path_buf();

        let meta: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(upgraded.join("metadata.json")).unwrap())
                .unwrap();
        assert_eq!(meta["provider"], "virtualbox");
        assert_eq!(fs::read_to_string(upgraded.join("box.ovf")).unwrap(), "<ovf/>");
        assert_eq!(
            fs::read_to_string(upgraded.join("nested/disk.vmdk")).unwrap(),
            "disk"
        );
        assert_eq!(fs::read_dir(&v1).unwrap().count(), 0);

        drop(guard);
        assert!(!upgraded.exists());
    }

    #[test]
    fn test_upgrade_v1_dir_keeps_existing_metadata() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let v1 = dir.path().join("v1");
        fs::create_dir_all(&v1).unwrap();
        fs::write(v1.join("box.ovf"), "<ovf/>").unwrap();
        fs::write(v1.join("metadata.json"), r#"{"provider":"vmware_desktop"}"#).unwrap();

        let guard = upgrade_v1_dir(&runtime, &v1, &dir.path().join("tmp")).unwrap();
        assert_eq!(
            fs::read_to_string(guard.path().join("metadata.json")).unwrap(),
            r#"{"provider":"vmware_desktop"}"#
        );
    }

    #[test]
    fn test_upgrade_collection_on_disk() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let root = dir.path().join("boxes");

        // V1 box directly under its name
        fs::create_dir_all(root.join("precise64")).unwrap();
        fs::write(root.join("precise64/box.ovf"), "<ovf/>").unwrap();
        fs::write(root.join("precise64/disk.vmdk"), "disk").unwrap();

        // Multi-provider box without versions
        fs::create_dir_all(root.join("org/box/virtualbox")).unwrap();
        fs::write(
            root.join("org/box/virtualbox/metadata.json"),
            r#"{"provider":"virtualbox"}"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("other/vmware")).unwrap();
        fs::write(
            root.join("other/vmware/metadata.json"),
            r#"{"provider":"vmware"}"#,
        )
        .unwrap();

        // Stray file is ignored
        fs::write(root.join("README"), "not a box").unwrap();

        let count = upgrade_collection(&runtime, &root, &dir.path().join("tmp")).unwrap();
        assert_eq!(count, 3);

        let meta = fs::read_to_string(root.join("precise64/0/virtualbox/metadata.json")).unwrap();
        assert_eq!(meta, r#"{"provider":"virtualbox"}"#);
        assert_eq!(
            fs::read_to_string(root.join("precise64/0/virtualbox/disk.vmdk")).unwrap(),
            "disk"
        );
        assert!(root.join("other/0/vmware/metadata.json").is_file());
        // Nested dirs of the old layout are treated as providers of "org"
        assert!(root.join("org/0/box/virtualbox/metadata.json").is_file());
        assert!(!root.join("README").exists());
        assert_eq!(fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_upgrade_collection_keeps_links_as_links() {
        use std::os::unix::fs::symlink;

        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let root = dir.path().join("boxes");
        let outside = dir.path().join("user_data");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("precious.txt"), "keep").unwrap();

        fs::create_dir_all(root.join("precise64")).unwrap();
        fs::write(root.join("precise64/box.ovf"), "<ovf/>").unwrap();
        symlink(&outside, root.join("precise64/shared")).unwrap();
        symlink(".", root.join("precise64/loop")).unwrap();
        symlink(&outside, root.join("linked")).unwrap();

        let count = upgrade_collection(&runtime, &root, &dir.path().join("tmp")).unwrap();
        assert_eq!(count, 1);

        let shared = root.join("precise64/0/virtualbox/shared");
        assert_eq!(fs::read_link(&shared).unwrap(), outside);
        assert!(
            fs::symlink_metadata(root.join("precise64/0/virtualbox/loop"))
                .unwrap()
                .file_type()
                .is_symlink()
        );
        assert!(!root.join("linked").exists());
        assert_eq!(fs::read_to_string(outside.join("precious.txt")).unwrap(), "keep");
    }

    #[test]
    fn test_upgrade_collection_rejects_staging_inside_root() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let root = dir.path().join("boxes");
        fs::create_dir_all(root.join("a/virtualbox")).unwrap();

        let err = upgrade_collection(&runtime, &root, &root.join(".tmp")).unwrap_err();
        assert!(err.to_string().contains("must not be inside"));
        // Nothing touched, staging cleaned up
        assert!(root.join("a/virtualbox").is_dir());
        assert!(!root.join(".tmp").read_dir().unwrap().any(|_| true));
    }

    #[test]
    fn test_upgrade_collection_failure_leaves_root_untouched() {
        let mut runtime = MockRuntime::new();
        let root = PathBuf::from("/boxes");
        let staging = PathBuf::from("/tmp/boxstore-add-temp-9");

        let staging_clone = staging.clone();
        runtime
            .expect_create_temp_dir()
            .returning(move |_, _| Ok(staging_clone.clone()));
        runtime
            .expect_read_dir()
            .with(eq(root.clone()))
            .returning(|p| Ok(vec![DirEntry::dir(p.join("a"))]));
        runtime.expect_is_file().returning(|_| false);
        runtime.expect_create_dir_all().returning(|_| Ok(()));
        runtime
            .expect_read_dir()
            .with(eq(root.join("a")))
            .returning(|p| Ok(vec![DirEntry::dir(p.join("virtualbox"))]));
        runtime
            .expect_copy_recursive()
            .returning(|_, _| Err(anyhow!("disk full")));
        // Only the staging dir is removed, never the root
        runtime
            .expect_exists()
            .with(eq(staging.clone()))
            .returning(|_| true);
        runtime
            .expect_remove_dir_all()
            .with(eq(staging.clone()))
            .times(1)
            .returning(|_| Ok(()));

        let err = upgrade_collection(&runtime, &root, Path::new("/tmp")).unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }
}
