//! Content operations (spec §4.6): `Download`, `Upload`, `InitiateUpload`,
//! `TouchFile`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::driver::{CephMountDriver, RequestContext};
use crate::error::{DriverError, Result};
use crate::reference::ResourceReference;

/// A byte range request for `Download`. Spec §4.6: ranges are not
/// supported — any non-empty slice yields `NotSupported`.
pub type Range = (u64, u64);

fn parent_component(chroot_rel: &str) -> Option<String> {
    Path::new(chroot_rel).parent().and_then(|p| p.to_str()).filter(|p| !p.is_empty()).map(str::to_string)
}

/// `Download` (spec §4.6): resolves, opens the file read-only, and returns
/// the open handle for the caller to stream from. The syscall-level
/// permission check happens at open time on the user's thread; reading
/// from the returned handle afterward is plain fd I/O.
pub fn download(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
    ranges: &[Range],
) -> Result<File> {
    const OP: &str = "Download";
    if !ranges.is_empty() {
        return Err(DriverError::NotSupported { op: OP });
    }
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let mut options = std::fs::OpenOptions::new();
        options.read(true);
        jail.open(&chroot_rel, &options)
    })
}

/// `Upload` (spec §4.6): creates the parent chain, opens
/// `O_CREATE|O_TRUNC|O_WRONLY` with the configured file mode, and copies
/// `reader` into it.
///
/// `reader` must be `Send + 'static` since the copy runs on the user's
/// dedicated thread (spec §5: the work closure owns everything it touches).
pub fn upload(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
    mut reader: Box<dyn Read + Send>,
) -> Result<u64> {
    const OP: &str = "Upload";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    let dir_mode = driver.config.dir_perms;
    let file_mode = driver.config.file_perms;
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        if let Some(parent) = parent_component(&chroot_rel) {
            jail.mkdir_all(&parent, dir_mode)?;
        }
        let mut file = jail.create(&chroot_rel, file_mode)?;
        let written = io::copy(&mut reader, &mut file).map_err(|e| DriverError::from_io(OP, chroot_rel.clone(), e))?;
        file.flush().map_err(|e| DriverError::from_io(OP, chroot_rel.clone(), e))?;
        Ok(written)
    })
}

/// `InitiateUpload` (spec §4.6): returns an opaque handle map so the caller
/// can stream directly to the resolved path via a subsequent `Upload`.
pub fn initiate_upload(
    driver: &CephMountDriver,
    _ctx: &RequestContext,
    reference: &ResourceReference,
    _length: Option<u64>,
) -> Result<HashMap<String, String>> {
    const OP: &str = "InitiateUpload";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let mut handle = HashMap::with_capacity(1);
    handle.insert("simple".to_string(), chroot_rel);
    Ok(handle)
}

/// `TouchFile` (spec §4.6): creates the parent chain, opens
/// `O_CREATE|O_WRONLY`, and closes immediately. Does *not* update mtime on
/// an existing file (no truncate, no write).
pub fn touch_file(driver: &CephMountDriver, ctx: &RequestContext, reference: &ResourceReference) -> Result<()> {
    const OP: &str = "TouchFile";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    let dir_mode = driver.config.dir_perms;
    let file_mode = driver.config.file_perms;
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        if let Some(parent) = parent_component(&chroot_rel) {
            jail.mkdir_all(&parent, dir_mode)?;
        }
        use std::os::unix::fs::OpenOptionsExt;
        let mut options = std::fs::OpenOptions::new();
        // `mode` only takes effect if the file is actually created by this
        // call; an existing file keeps its own mode and mtime untouched.
        options.write(true).create(true).mode(file_mode);
        jail.open(&chroot_rel, &options)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::identity::UserIdentity;
    use std::io::Read as _;
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
            username: "bob".into(),
            uid: 5002,
            gid: 5002,
            groups: vec![],
        })
    }

    #[test]
    fn upload_then_download_round_trips_content() {
        let dir = tempdir().unwrap();
        let driver = test_driver(dir.path());
        let reference = ResourceReference::path("/nested/file.txt").unwrap();
        let written = upload(&driver, &ctx(), &reference, Box::new(&b"hello world"[..])).unwrap();
        assert_eq!(written, 11);

        let mut file = download(&driver, &ctx(), &reference, &[]).unwrap();
        let mut buf = String::new();
        file.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello world");
        driver.shutdown();
    }

    #[test]
    fn download_with_ranges_is_not_supported() {
        let dir = tempdir().unwrap();
        let driver = test_driver(dir.path());
        let reference = ResourceReference::path("/f.txt").unwrap();
        upload(&driver, &ctx(), &reference, Box::new(&b"x"[..])).unwrap();
        let result = download(&driver, &ctx(), &reference, &[(0, 1)]);
        assert!(matches!(result, Err(DriverError::NotSupported { .. })));
        driver.shutdown();
    }
}
