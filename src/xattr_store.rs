//! Extended-attribute helpers shared by arbitrary metadata (spec §4.6),
//! advisory locks (spec §4.6), and quota (spec §4.6). Uses the `xattr`
//! crate, which wraps `{set,get,remove,list}xattr(2)` the way the `xattr`
//! dependency is used elsewhere in the pack (e.g. the wormhole passthrough
//! filesystem) rather than hand-rolling the raw syscalls.

use std::path::Path;

use crate::error::{DriverError, Result};

/// Namespace prefixes already recognized by the kernel (`user`, `trusted`,
/// `system`, `security`) plus CephFS's own virtual `ceph.*` namespace (e.g.
/// `ceph.dir.rbytes`). A key already carrying one of these is left
/// untouched; anything else is assumed to be a bare, unnamespaced key.
const KNOWN_NAMESPACES: &[&str] = &["user.", "trusted.", "system.", "security.", "ceph."];

/// Normalizes a user-supplied xattr key by prefixing it with `user.` if it
/// doesn't already carry a recognized namespace prefix (spec §4.6).
pub fn normalize_key(key: &str) -> String {
    if KNOWN_NAMESPACES.iter().any(|ns| key.starts_with(ns)) {
        key.to_string()
    } else {
        format!("user.{key}")
    }
}

/// `report_path` is the chroot-relative path used to build any error (spec
/// §7: errors never carry the absolute local mount path); `path` is the
/// real filesystem path the syscall runs against.
pub fn set(path: &Path, key: &str, value: &[u8], op: &'static str, report_path: &str) -> Result<()> {
    xattr::set(path, normalize_key(key), value).map_err(|e| DriverError::from_io(op, report_path.to_string(), e))
}

pub fn get(path: &Path, key: &str, op: &'static str, report_path: &str) -> Result<Option<Vec<u8>>> {
    xattr::get(path, normalize_key(key)).map_err(|e| DriverError::from_io(op, report_path.to_string(), e))
}

/// Removes an xattr; a missing attribute is silently ignored (spec §4.6,
/// §7: "missing attribute during UnsetArbitraryMetadata (ignored)").
pub fn remove(path: &Path, key: &str, op: &'static str, report_path: &str) -> Result<()> {
    match xattr::remove(path, normalize_key(key)) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::ENODATA) => Ok(()),
        Err(e) => Err(DriverError::from_io(op, report_path.to_string(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_key_prefixes_bare_keys() {
        assert_eq!(normalize_key("custom-key"), "user.custom-key");
    }

    #[test]
    fn normalize_key_leaves_known_namespaces_untouched() {
        assert_eq!(normalize_key("user.custom-key"), "user.custom-key");
        assert_eq!(normalize_key("ceph.dir.rbytes"), "ceph.dir.rbytes");
        assert_eq!(normalize_key("trusted.overlay.opaque"), "trusted.overlay.opaque");
        assert_eq!(normalize_key("system.posix_acl_access"), "system.posix_acl_access");
        assert_eq!(normalize_key("security.selinux"), "security.selinux");
    }
}
