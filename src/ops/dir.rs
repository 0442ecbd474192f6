//! Directory and metadata operations: `CreateDir`, `Delete`, `Move`,
//! `GetMD`, `ListFolder`. Each follows the standard template: resolve the
//! reference to a chroot-relative path (which also runs the containment
//! check), then dispatch the actual syscalls to the caller's user thread.

use std::path::Path;

use log::debug;

use crate::driver::{CephMountDriver, RequestContext};
use crate::error::Result;
use crate::reference::ResourceReference;
use crate::resource_info::{build_resource_info, ResourceInfo};

/// `CreateDir`: `mkdir -p` with the configured directory mode.
pub fn create_dir(driver: &CephMountDriver, ctx: &RequestContext, reference: &ResourceReference) -> Result<()> {
    const OP: &str = "CreateDir";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    let mode = driver.config.dir_perms;
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || jail.mkdir_all(&chroot_rel, mode))
}

/// `Delete`: idempotent, a missing target is success not an error;
/// directories are removed recursively.
pub fn delete(driver: &CephMountDriver, ctx: &RequestContext, reference: &ResourceReference) -> Result<()> {
    const OP: &str = "Delete";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let meta = match jail.lstat(&chroot_rel) {
            Ok(meta) => meta,
            Err(crate::error::DriverError::NotFound { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };
        if meta.is_dir() {
            jail.remove_all(&chroot_rel)
        } else {
            jail.remove(&chroot_rel)
        }
    })
}

/// `Move`: resolves both references, creates the destination's parent
/// chain, then `rename(2)`s. Cross-device failures are reported as
/// received, never papered over with a fallback copy.
pub fn mv(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    from: &ResourceReference,
    to: &ResourceReference,
) -> Result<()> {
    const OP: &str = "Move";
    let old_rel = driver.resolve_reference(from, OP)?;
    let new_rel = driver.resolve_reference(to, OP)?;
    let jail = driver.jail.clone();
    let dir_mode = driver.config.dir_perms;
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        if let Some(parent) = Path::new(&new_rel).parent() {
            if let Some(parent) = parent.to_str() {
                if !parent.is_empty() {
                    jail.mkdir_all(parent, dir_mode)?;
                }
            }
        }
        jail.rename(&old_rel, &new_rel)
    })
}

/// `GetMD`: resolves, stats, and builds a [`ResourceInfo`].
pub fn get_md(driver: &CephMountDriver, ctx: &RequestContext, reference: &ResourceReference) -> Result<ResourceInfo> {
    const OP: &str = "GetMD";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    let translator = driver.translator.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let meta = jail.lstat(&chroot_rel)?;
        let readlink_target = if meta.file_type().is_symlink() { Some(jail.readlink(&chroot_rel)?) } else { None };
        Ok(build_resource_info(&translator, &chroot_rel, &meta, readlink_target))
    })
}

/// `ListFolder`: enumerates entries in arrival order, filters
/// hidden names (`.`, `..`, the configured uploads folder), and builds a
/// [`ResourceInfo`] for each; entries that fail the builder are skipped
/// with a debug log rather than failing the whole listing.
pub fn list_folder(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
) -> Result<Vec<ResourceInfo>> {
    const OP: &str = "ListFolder";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    let translator = driver.translator.clone();
    let uploads = driver.config.uploads.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let entries = jail.open_dir(&chroot_rel)?;
        let mut infos = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.file_name == "." || entry.file_name == ".." || entry.file_name == uploads {
                continue;
            }
            let meta = match jail.lstat(&entry.chroot_rel) {
                Ok(meta) => meta,
                Err(e) => {
                    debug!("ListFolder: skipping {}: {e}", entry.chroot_rel);
                    continue;
                }
            };
            let readlink_target = if meta.file_type().is_symlink() {
                jail.readlink(&entry.chroot_rel).ok()
            } else {
                None
            };
            infos.push(build_resource_info(&translator, &entry.chroot_rel, &meta, readlink_target));
        }
        Ok(infos)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::identity::UserIdentity;
    use std::fs;
    use tempfile::tempdir;

    fn test_driver(root: &std::path::Path) -> CephMountDriver {
        let mut config = DriverConfig::default();
        config.testing_allow_local_mode = true;
        std::env::set_var(crate::config::TEST_CHROOT_DIR_ENV, root);
        CephMountDriver::new(config).unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::new(UserIdentity {
            opaque_id: "x".into(),
            idp: "idp".into(),
            username: "alice".into(),
            uid: 5001,
            gid: 5001,
            groups: vec![],
        })
    }

    #[test]
    fn create_dir_is_idempotent() {
        let dir = tempdir().unwrap();
        let driver = test_driver(dir.path());
        let reference = ResourceReference::path("/a/b/c").unwrap();
        create_dir(&driver, &ctx(), &reference).unwrap();
        create_dir(&driver, &ctx(), &reference).unwrap();
        assert!(dir.path().join("a/b/c").is_dir());
        driver.shutdown();
    }

    #[test]
    fn delete_missing_target_succeeds() {
        let dir = tempdir().unwrap();
        let driver = test_driver(dir.path());
        let reference = ResourceReference::path("/not-there").unwrap();
        delete(&driver, &ctx(), &reference).unwrap();
        driver.shutdown();
    }

    #[test]
    fn traversal_attack_is_rejected_before_any_syscall() {
        let dir = tempdir().unwrap();
        let driver = test_driver(dir.path());
        let reference = ResourceReference::path("/../../etc/passwd").unwrap();
        let result = get_md(&driver, &ctx(), &reference);
        assert!(matches!(result, Err(crate::error::DriverError::PermissionDenied { .. })));
        driver.shutdown();
    }

    #[test]
    fn list_folder_skips_hidden_and_uploads_entries() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bar.txt"), b"hi").unwrap();
        fs::create_dir(dir.path().join(".uploads")).unwrap();
        let driver = test_driver(dir.path());
        let reference = ResourceReference::path("/").unwrap();
        let entries = list_folder(&driver, &ctx(), &reference).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].external_path, "/bar.txt");
        driver.shutdown();
    }
}
