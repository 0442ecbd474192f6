//! Path translator (spec §4.4): pure conversions between the three path
//! coordinates (external, chroot-relative, RADOS-volume), plus the
//! containment check every operation and inode-resolver output must pass
//! before any syscall.

use std::path::{Component, Path};

use log::warn;

use crate::config::MountDescriptor;
use crate::error::{DriverError, Result};

/// Pure path-coordinate conversions derived from a [`MountDescriptor`]
/// (spec §4.4). Stateless and `Clone`; safe to share across threads.
#[derive(Debug, Clone)]
pub struct PathTranslator {
    ceph_volume_path: String,
    local_mount_point: String,
}

impl PathTranslator {
    pub fn new(mount: &MountDescriptor) -> Self {
        PathTranslator {
            ceph_volume_path: mount.ceph_volume_path.clone(),
            local_mount_point: mount.local_mount_point.clone(),
        }
    }

    /// Builds a translator for `testing_allow_local_mode` (spec §6), where
    /// there is no RADOS volume path to speak of; both prefixes are `/`.
    pub fn identity() -> Self {
        PathTranslator { ceph_volume_path: "/".to_string(), local_mount_point: "/".to_string() }
    }

    /// Canonicalizes `external` (collapsing `.`/`..` lexically) and rejects
    /// it if any `..` remains unresolved against the root (spec §8
    /// invariant 2).
    fn canonicalize_lexically(external: &str) -> Result<String> {
        let mut stack: Vec<&str> = Vec::new();
        for component in Path::new(external).components() {
            match component {
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    if stack.pop().is_none() {
                        return Err(DriverError::containment("CanonicalizePath", external.to_string()));
                    }
                }
                Component::Normal(part) => stack.push(part.to_str().ok_or_else(|| {
                    DriverError::bad_request("CanonicalizePath", "path is not valid UTF-8")
                })?),
            }
        }
        Ok(stack.join("/"))
    }

    /// `to_chroot`: canonicalize, reject `..`, strip leading `/`, map root
    /// to `"."`.
    pub fn to_chroot(&self, external: &str) -> Result<String> {
        let canonical = Self::canonicalize_lexically(external)?;
        let chroot_rel = if canonical.is_empty() { ".".to_string() } else { canonical };
        self.check_containment(&chroot_rel, "ToChroot")?;
        Ok(chroot_rel)
    }

    /// `from_chroot`: inverse of [`Self::to_chroot`]; `"."` maps to `/`.
    pub fn from_chroot(&self, chroot_rel: &str) -> String {
        if chroot_rel == "." || chroot_rel.is_empty() {
            "/".to_string()
        } else {
            format!("/{chroot_rel}")
        }
    }

    /// `user_to_rados`: `ceph_volume_path + external`, with the identity
    /// special-cases from spec §4.4.
    pub fn user_to_rados(&self, external: &str) -> String {
        if self.ceph_volume_path == "/" || self.local_mount_point == "/" {
            return external.to_string();
        }
        let trimmed = self.ceph_volume_path.trim_end_matches('/');
        if external == "/" {
            trimmed.to_string()
        } else {
            format!("{trimmed}{external}")
        }
    }

    /// `rados_to_user`: strips the `ceph_volume_path` prefix, ensuring a
    /// leading `/` (spec §9 open question: an empty result after stripping
    /// — e.g. the chroot equals the entire local mount — maps to `/`,
    /// decided in `DESIGN.md`).
    pub fn rados_to_user(&self, rados_path: &str) -> Result<String> {
        if self.ceph_volume_path == "/" || self.local_mount_point == "/" {
            return Ok(if rados_path.is_empty() { "/".to_string() } else { rados_path.to_string() });
        }
        let prefix = self.ceph_volume_path.trim_end_matches('/');
        let stripped = rados_path.strip_prefix(prefix).ok_or_else(|| {
            DriverError::containment("RadosToUser", rados_path.to_string())
        })?;
        Ok(if stripped.is_empty() { "/".to_string() } else { stripped.to_string() })
    }

    /// The containment check (spec §4.4): canonicalize, reject if `..`
    /// remains; when `ceph_volume_path != "/"`, reject paths whose RADOS
    /// form isn't prefixed by it; when the local mount point isn't `/`,
    /// reject paths whose local form isn't prefixed by it. Called before
    /// every syscall and again after every inode-resolver output (spec
    /// §4.8 step 5, "defense in depth").
    pub fn check_containment(&self, chroot_rel: &str, op: &'static str) -> Result<()> {
        if chroot_rel.split('/').any(|c| c == "..") {
            warn!("security: rejecting path escaping containment: op={op} path={chroot_rel:?}");
            return Err(DriverError::containment(op, chroot_rel.to_string()));
        }

        if self.ceph_volume_path != "/" {
            let rados = self.user_to_rados(&self.from_chroot(chroot_rel));
            let prefix = self.ceph_volume_path.trim_end_matches('/');
            if !rados.starts_with(prefix) {
                warn!("security: path outside configured ceph volume path: op={op} path={chroot_rel:?}");
                return Err(DriverError::containment(op, chroot_rel.to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> PathTranslator {
        let mount = MountDescriptor {
            monitor_host: "mon1".into(),
            client_name: "admin".into(),
            ceph_volume_path: "/volumes/shared".into(),
            local_mount_point: "/mnt/cephfs".into(),
            config_file: "/etc/ceph/ceph.conf".into(),
            keyring_file: "/etc/ceph/ceph.client.admin.keyring".into(),
        };
        PathTranslator::new(&mount)
    }

    #[test]
    fn root_round_trips_through_dot() {
        let t = translator();
        assert_eq!(t.to_chroot("/").unwrap(), ".");
        assert_eq!(t.from_chroot("."), "/");
    }

    #[test]
    fn nested_path_round_trips() {
        let t = translator();
        let chroot_rel = t.to_chroot("/projects/a.txt").unwrap();
        assert_eq!(chroot_rel, "projects/a.txt");
        assert_eq!(t.from_chroot(&chroot_rel), "/projects/a.txt");
    }

    #[test]
    fn dotdot_above_root_is_rejected() {
        let t = translator();
        assert!(t.to_chroot("/../../etc/passwd").is_err());
    }

    #[test]
    fn user_to_rados_prefixes_volume_path() {
        let t = translator();
        assert_eq!(t.user_to_rados("/projects/a.txt"), "/volumes/shared/projects/a.txt");
    }

    #[test]
    fn rados_to_user_strips_volume_path() {
        let t = translator();
        assert_eq!(t.rados_to_user("/volumes/shared/projects/a.txt").unwrap(), "/projects/a.txt");
    }

    #[test]
    fn rados_to_user_rejects_paths_outside_volume() {
        let t = translator();
        assert!(t.rados_to_user("/volumes/other/a.txt").is_err());
    }

    #[test]
    fn identity_translator_is_a_passthrough() {
        let t = PathTranslator::identity();
        assert_eq!(t.user_to_rados("/a/b"), "/a/b");
        assert_eq!(t.rados_to_user("/a/b").unwrap(), "/a/b");
    }
}
