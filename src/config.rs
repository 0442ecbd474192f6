//! Driver configuration and mount descriptor derivation from an
//! fstab-shaped line.
//!
//! Uses the same plain, hand-parsed option style as `mount_options.rs`
//! rather than pulling in a general config crate: an fstab line has a
//! fixed, small field count, so a whitespace split is all that's needed.

use std::env;

use log::warn;

use crate::error::{DriverError, Result};

/// Explicit configuration record for [`crate::CephMountDriver`].
///
/// Every recognized configuration key has a field here with the documented
/// default; a host service that parses a dynamically-typed map is expected
/// to populate this record and log a warning for any key it doesn't
/// recognize (this crate never sees the raw map).
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Folder name treated as hidden in directory listings (default `.uploads`).
    pub uploads: String,
    /// Mode bits for newly created directories (default `0o755`).
    pub dir_perms: u32,
    /// Mode bits for newly created files (default `0o644`).
    pub file_perms: u32,
    /// Default total quota reported when no xattr is present (default 50_000_000_000).
    pub user_quota_bytes: u64,
    /// Fallback uid for the `nobody` identity (default 65534).
    pub nobody_uid: i32,
    /// Fallback gid for the `nobody` identity (default 65534).
    pub nobody_gid: i32,
    /// Raw `/etc/fstab`-shaped line describing the CephFS mount. Required
    /// unless `testing_allow_local_mode` is set.
    pub fstabentry: Option<String>,
    /// Bypasses the `fstabentry` requirement; the chroot root is then taken
    /// from `CEPHMOUNT_TEST_CHROOT_DIR`.
    pub testing_allow_local_mode: bool,
    /// Subdirectory under the local mount point treated as the effective root.
    pub root: Option<String>,
    /// Thread idle timeout before eviction.
    pub thread_ttl: std::time::Duration,
    /// Janitor wakeup period.
    pub cleanup_period: std::time::Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            uploads: ".uploads".to_string(),
            dir_perms: 0o755,
            file_perms: 0o644,
            user_quota_bytes: 50_000_000_000,
            nobody_uid: 65534,
            nobody_gid: 65534,
            fstabentry: None,
            testing_allow_local_mode: false,
            root: None,
            thread_ttl: std::time::Duration::from_secs(300),
            cleanup_period: std::time::Duration::from_secs(60),
        }
    }
}

/// Environment variable consulted when `testing_allow_local_mode` is set.
pub const TEST_CHROOT_DIR_ENV: &str = "CEPHMOUNT_TEST_CHROOT_DIR";

/// The tuple derived once from an fstab-like configuration line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountDescriptor {
    pub monitor_host: String,
    pub client_name: String,
    /// e.g. `/volumes/shared`.
    pub ceph_volume_path: String,
    /// e.g. `/mnt/cephfs`.
    pub local_mount_point: String,
    pub config_file: String,
    pub keyring_file: String,
}

impl MountDescriptor {
    /// Parses one `/etc/fstab`-shaped line describing a CephFS kernel
    /// mount, e.g.:
    ///
    /// ```text
    /// mon1,mon2,mon3:/volumes/shared /mnt/cephfs ceph name=admin,conf=/etc/ceph/ceph.conf,keyring=/etc/ceph/ceph.client.admin.keyring,_netdev 0 0
    /// ```
    ///
    /// Only the fields this crate needs are extracted; everything else
    /// (mount type, `_netdev`, dump/pass fields) is accepted but ignored.
    pub fn parse_fstab_entry(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(DriverError::bad_request(
                "ParseMountDescriptor",
                format!("fstab entry has too few fields: {line:?}"),
            ));
        }

        let source = fields[0];
        let local_mount_point = fields[1].to_string();
        let options = fields.get(3).copied().unwrap_or("");

        let (monitor_host, ceph_volume_path) = match source.split_once(':') {
            Some((host, path)) if !path.is_empty() => (host.to_string(), path.to_string()),
            Some((host, _)) => (host.to_string(), "/".to_string()),
            None => (source.to_string(), "/".to_string()),
        };

        let mut client_name = "admin".to_string();
        let mut config_file = "/etc/ceph/ceph.conf".to_string();
        let mut keyring_file = String::new();
        for opt in options.split(',') {
            if let Some(value) = opt.strip_prefix("name=") {
                client_name = value.to_string();
            } else if let Some(value) = opt.strip_prefix("conf=") {
                config_file = value.to_string();
            } else if let Some(value) = opt.strip_prefix("keyring=") {
                keyring_file = value.to_string();
            }
        }
        if keyring_file.is_empty() {
            keyring_file = format!("/etc/ceph/ceph.client.{client_name}.keyring");
        }

        Ok(MountDescriptor {
            monitor_host,
            client_name,
            ceph_volume_path,
            local_mount_point,
            config_file,
            keyring_file,
        })
    }
}

/// Resolves the effective filesystem root to chroot into, combining
/// `fstabentry`/`testing_allow_local_mode`/`root`.
pub fn resolve_effective_root(config: &DriverConfig, mount: Option<&MountDescriptor>) -> Result<String> {
    let base = if config.testing_allow_local_mode {
        env::var(TEST_CHROOT_DIR_ENV).map_err(|_| {
            DriverError::bad_request(
                "ResolveRoot",
                format!("testing_allow_local_mode is set but {TEST_CHROOT_DIR_ENV} is unset"),
            )
        })?
    } else {
        let mount = mount.ok_or_else(|| {
            DriverError::bad_request("ResolveRoot", "fstabentry is required unless testing_allow_local_mode is set")
        })?;
        mount.local_mount_point.clone()
    };

    match &config.root {
        Some(sub) if !sub.is_empty() => {
            let sub = sub.trim_start_matches('/');
            Ok(format!("{}/{}", base.trim_end_matches('/'), sub))
        }
        _ => Ok(base),
    }
}

/// Logs a warning for a configuration key the host service supplied that
/// this crate does not recognize. Unknown keys are ignored rather than
/// treated as fatal.
pub fn warn_unrecognized_key(key: &str) {
    warn!("unrecognized cephmount configuration key ignored: {key}");
}
