//! Lock operations: thin wrappers around [`crate::locks`] that add
//! reference resolution and thread dispatch.

use std::sync::Arc;

use crate::driver::{CephMountDriver, RequestContext};
use crate::error::Result;
use crate::locks::{self, AdvisoryLockRecord};
use crate::reference::ResourceReference;

pub fn set_lock(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
    record: AdvisoryLockRecord,
) -> Result<()> {
    const OP: &str = "SetLock";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    let registry = Arc::clone(&driver.lock_registry);
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let absolute = jail.absolute_path_for_xattr(&chroot_rel)?;
        locks::set_lock(&registry, &absolute, &chroot_rel, &record)
    })
}

pub fn get_lock(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
) -> Result<AdvisoryLockRecord> {
    const OP: &str = "GetLock";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let absolute = jail.absolute_path_for_xattr(&chroot_rel)?;
        locks::get_lock(&absolute, &chroot_rel)
    })
}

pub fn refresh_lock(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
    new_record: AdvisoryLockRecord,
    existing_id: Option<String>,
) -> Result<()> {
    const OP: &str = "RefreshLock";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    let registry = Arc::clone(&driver.lock_registry);
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let absolute = jail.absolute_path_for_xattr(&chroot_rel)?;
        locks::refresh_lock(&registry, &absolute, &chroot_rel, &new_record, existing_id.as_deref())
    })
}

pub fn unlock(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
    record: AdvisoryLockRecord,
) -> Result<()> {
    const OP: &str = "Unlock";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    let registry = Arc::clone(&driver.lock_registry);
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let absolute = jail.absolute_path_for_xattr(&chroot_rel)?;
        locks::unlock(&registry, &absolute, &chroot_rel, &record)
    })
}
