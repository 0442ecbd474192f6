//! Quota reporting (spec §4.6): `GetQuota` reads a per-resource max-bytes
//! xattr, falling back to the configured default; `used` comes from
//! CephFS's own recursive-size xattr when present.

use std::path::Path;

use crate::config::DriverConfig;
use crate::error::Result;
use crate::xattr_store;

/// User-settable override for the quota ceiling (spec §4.6).
const QUOTA_MAX_BYTES_KEY: &str = "user.quota.max_bytes";
/// CephFS's own recursive directory size accounting, maintained by the MDS.
const CEPH_DIR_RBYTES_KEY: &str = "ceph.dir.rbytes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

fn parse_xattr_u64(raw: Option<Vec<u8>>) -> Option<u64> {
    let raw = raw?;
    std::str::from_utf8(&raw).ok()?.trim().trim_end_matches('\0').parse::<u64>().ok()
}

/// `GetQuota` (spec §4.6): `user.quota.max_bytes` overrides
/// `config.user_quota_bytes` as the ceiling; `ceph.dir.rbytes` is read
/// directly since it isn't writable from userspace (it's the MDS's own
/// recursive accounting for the directory) and absence just means "unknown
/// usage", reported as `0`. `chroot_rel` is used only for error reporting.
pub fn get_quota(absolute_path: &Path, chroot_rel: &str, config: &DriverConfig) -> Result<QuotaInfo> {
    let total_bytes =
        parse_xattr_u64(xattr_store::get(absolute_path, QUOTA_MAX_BYTES_KEY, "GetQuota", chroot_rel)?)
            .unwrap_or(config.user_quota_bytes);
    let used_bytes =
        parse_xattr_u64(xattr_store::get(absolute_path, CEPH_DIR_RBYTES_KEY, "GetQuota", chroot_rel)?).unwrap_or(0);
    Ok(QuotaInfo { total_bytes, used_bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn falls_back_to_configured_default_when_xattr_absent() {
        let dir = tempdir().unwrap();
        let config = DriverConfig::default();
        let quota = get_quota(dir.path(), ".", &config).unwrap();
        assert_eq!(quota.total_bytes, config.user_quota_bytes);
        assert_eq!(quota.used_bytes, 0);
    }

    #[test]
    fn xattr_override_takes_precedence() {
        let dir = tempdir().unwrap();
        xattr_store::set(dir.path(), QUOTA_MAX_BYTES_KEY, b"12345", "Test", ".").unwrap();
        let config = DriverConfig::default();
        let quota = get_quota(dir.path(), ".", &config).unwrap();
        assert_eq!(quota.total_bytes, 12345);
    }
}
