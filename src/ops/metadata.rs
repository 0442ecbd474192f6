//! Arbitrary metadata operations: `SetArbitraryMetadata` and
//! `UnsetArbitraryMetadata`, backed by the shared [`crate::xattr_store`]
//! helper.

use std::collections::HashMap;

use crate::driver::{CephMountDriver, RequestContext};
use crate::error::Result;
use crate::reference::ResourceReference;
use crate::xattr_store;

/// `SetArbitraryMetadata`: `setxattr`s each entry, prefixing with `user.`
/// if not already namespaced. Aborts on the first failure; already-applied
/// keys are not rolled back, errors propagate with no transactional
/// rollback promised.
pub fn set_arbitrary_metadata(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
    metadata: HashMap<String, String>,
) -> Result<()> {
    const OP: &str = "SetArbitraryMetadata";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let absolute = jail.absolute_path_for_xattr(&chroot_rel)?;
        for (key, value) in metadata {
            xattr_store::set(&absolute, &key, value.as_bytes(), OP, &chroot_rel)?;
        }
        Ok(())
    })
}

/// `GetArbitraryMetadata`: `getxattr`s each requested key, normalizing the
/// `user.` prefix the same way `SetArbitraryMetadata` does (spec §8's xattr
/// round-trip law). Keys with no stored value are omitted from the result
/// rather than erroring.
pub fn get_arbitrary_metadata(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
    keys: Vec<String>,
) -> Result<HashMap<String, String>> {
    const OP: &str = "GetArbitraryMetadata";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let absolute = jail.absolute_path_for_xattr(&chroot_rel)?;
        let mut result = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = xattr_store::get(&absolute, &key, OP, &chroot_rel)? {
                if let Ok(value) = String::from_utf8(value) {
                    result.insert(key, value);
                }
            }
        }
        Ok(result)
    })
}

/// `UnsetArbitraryMetadata`: `removexattr`s each key; a missing attribute
/// is silently ignored rather than surfaced as an error.
pub fn unset_arbitrary_metadata(
    driver: &CephMountDriver,
    ctx: &RequestContext,
    reference: &ResourceReference,
    keys: Vec<String>,
) -> Result<()> {
    const OP: &str = "UnsetArbitraryMetadata";
    let chroot_rel = driver.resolve_reference(reference, OP)?;
    let jail = driver.jail.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let absolute = jail.absolute_path_for_xattr(&chroot_rel)?;
        for key in keys {
            xattr_store::remove(&absolute, &key, OP, &chroot_rel)?;
        }
        Ok(())
    })
}
