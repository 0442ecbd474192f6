//! Grant operations: thin wrappers around [`crate::grants`] that add
//! reference resolution and thread dispatch.

use crate::driver::{CephMountDriver, RequestContext};
use crate::error::Result;
use crate::grants::{self, Grantee, PosixAclEntry};
use crate::reference::ResourceReference;

/// `AddGrant`/`UpdateGrant` share the same semantics: `setfacl` overwrites
/// an existing entry for the same grantee.
pub fn add_or_update_grant(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
    grantee: Grantee,
    rwx: String,
) -> Result<()> {
    const OP: &str = "AddGrant";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let absolute = jail.absolute_path_for_xattr(&chroot_rel)?;
        let is_dir = jail.stat(&chroot_rel)?.is_dir();
        grants::add_or_update_grant(&absolute, &chroot_rel, is_dir, &grantee, &rwx)
    })
}

/// `RemoveGrant`: removes the ACL entry for the grantee, matching the
/// userland `setfacl -x` contract.
pub fn remove_grant(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
    grantee: Grantee,
) -> Result<()> {
    const OP: &str = "RemoveGrant";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let absolute = jail.absolute_path_for_xattr(&chroot_rel)?;
        let is_dir = jail.stat(&chroot_rel)?.is_dir();
        grants::remove_grant(&absolute, &chroot_rel, is_dir, &grantee, OP)
    })
}

/// `DenyGrant`: this driver has no separate "deny" ACL entry, so it shares
/// `RemoveGrant`'s implementation (spec §4.6), but keeps its own named
/// entry point and error/log tag.
pub fn deny_grant(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
    grantee: Grantee,
) -> Result<()> {
    const OP: &str = "DenyGrant";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let absolute = jail.absolute_path_for_xattr(&chroot_rel)?;
        let is_dir = jail.stat(&chroot_rel)?.is_dir();
        grants::remove_grant(&absolute, &chroot_rel, is_dir, &grantee, OP)
    })
}

/// `ListGrants`: returns the canonically-ordered, reverse-resolved ACL
/// entries.
pub fn list_grants(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
) -> Result<Vec<PosixAclEntry>> {
    const OP: &str = "ListGrants";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let absolute = jail.absolute_path_for_xattr(&chroot_rel)?;
        grants::list_grants(&absolute, &chroot_rel)
    })
}
