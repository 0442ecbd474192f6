//! Advisory locks (spec §4.6): a kernel `flock(2)` held for the lifetime
//! of the grant, paired with a JSON+base64-encoded record stored under a
//! fixed xattr key so `GetLock` can describe an existing lock without
//! holding the file open.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use nix::fcntl::{flock, FlockArg};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};
use crate::xattr_store;

/// Reserved xattr key holding the base64-JSON lock payload (spec §6).
const LOCK_XATTR_KEY: &str = "user.reva.lockpayload";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockType {
    Exclusive,
    Shared,
}

/// Identifies who holds a lock: a user or an application name (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub user: Option<String>,
    pub app_name: Option<String>,
}

impl LockHolder {
    /// Holder equality per spec §4.6's `RefreshLock` rule: "require same
    /// holder (user equality *or* matching app name)".
    fn matches(&self, other: &LockHolder) -> bool {
        (self.user.is_some() && self.user == other.user)
            || (self.app_name.is_some() && self.app_name == other.app_name)
    }
}

/// An advisory lock record (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryLockRecord {
    pub lock_id: String,
    pub lock_type: LockType,
    pub holder: LockHolder,
    pub expiration_seconds: i64,
}

/// Holds the open, `flock`'d file descriptors backing live lock grants
/// (spec §4.6: the flock is held for the grant's lifetime, not just the
/// instant `SetLock` runs), keyed by the real filesystem path. Mirrors the
/// bookkeeping shape of [`crate::thread_pool::UserThreadPool`]'s
/// `Mutex<HashMap<...>>` of live threads.
pub struct LockRegistry {
    held: Mutex<HashMap<PathBuf, File>>,
}

impl std::fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockRegistry").field("held_locks", &self.held.lock().len()).finish()
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        LockRegistry { held: Mutex::new(HashMap::new()) }
    }

    /// Stores `file` as the holder of the grant at `path`, replacing (and
    /// thereby dropping/unlocking) whatever this registry previously held
    /// for the same path.
    fn hold(&self, path: PathBuf, file: File) {
        self.held.lock().insert(path, file);
    }

    /// Removes and returns the held file for `path`, if this process is
    /// the one holding it.
    fn release(&self, path: &Path) -> Option<File> {
        self.held.lock().remove(path)
    }
}

fn now_seconds() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

fn encode(record: &AdvisoryLockRecord) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(record)
        .map_err(|e| DriverError::bad_request("SetLock", format!("failed to encode lock record: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json).into_bytes())
}

fn decode(raw: &[u8], op: &'static str) -> Result<AdvisoryLockRecord> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(raw)
        .map_err(|e| DriverError::bad_request(op, format!("malformed lock payload (base64): {e}")))?;
    serde_json::from_slice(&decoded)
        .map_err(|e| DriverError::bad_request(op, format!("malformed lock payload (json): {e}")))
}

fn flock_arg(lock_type: LockType) -> FlockArg {
    match lock_type {
        LockType::Exclusive => FlockArg::LockExclusiveNonblock,
        LockType::Shared => FlockArg::LockSharedNonblock,
    }
}

/// `SetLock` (spec §4.6): opens the target read-write, acquires a
/// non-blocking `flock`, writes the serialized record to the fixed xattr
/// key, then hands the open, still-locked file to `registry` so the flock
/// is held for the grant's lifetime instead of being released the instant
/// this call returns. A competing `SetLock` on the same file fails with
/// `PermissionDenied` while the flock is held (spec §5 scenario: a second
/// exclusive grant is rejected, not silently serialized).
pub fn set_lock(registry: &LockRegistry, absolute_path: &Path, chroot_rel: &str, record: &AdvisoryLockRecord) -> Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(absolute_path)
        .map_err(|e| DriverError::from_io("SetLock", chroot_rel.to_string(), e))?;

    flock(file.as_fd(), flock_arg(record.lock_type))
        .map_err(|e| DriverError::from_nix("SetLock", chroot_rel.to_string(), e))?;

    let payload = encode(record)?;
    xattr_store::set(absolute_path, LOCK_XATTR_KEY, &payload, "SetLock", chroot_rel)?;
    registry.hold(absolute_path.to_path_buf(), file);
    Ok(())
}

/// `GetLock` (spec §4.6): reads the xattr; if expired, removes it and
/// reports `NotFound`.
pub fn get_lock(absolute_path: &Path, chroot_rel: &str) -> Result<AdvisoryLockRecord> {
    let raw = xattr_store::get(absolute_path, LOCK_XATTR_KEY, "GetLock", chroot_rel)?
        .ok_or_else(|| DriverError::NotFound { op: "GetLock", path: chroot_rel.to_string() })?;
    let record = decode(&raw, "GetLock")?;
    if record.expiration_seconds < now_seconds() {
        xattr_store::remove(absolute_path, LOCK_XATTR_KEY, "GetLock", chroot_rel)?;
        return Err(DriverError::NotFound { op: "GetLock", path: chroot_rel.to_string() });
    }
    Ok(record)
}

/// `RefreshLock` (spec §4.6): requires an existing lock with the same
/// holder (and matching `existing_id` if supplied), then re-runs `SetLock`.
pub fn refresh_lock(
    registry: &LockRegistry,
    absolute_path: &Path,
    chroot_rel: &str,
    new_record: &AdvisoryLockRecord,
    existing_id: Option<&str>,
) -> Result<()> {
    let existing = get_lock(absolute_path, chroot_rel)?;
    if !existing.holder.matches(&new_record.holder) {
        return Err(DriverError::PermissionDenied { op: "RefreshLock", path: chroot_rel.to_string() });
    }
    if let Some(expected_id) = existing_id {
        if existing.lock_id != expected_id {
            return Err(DriverError::bad_request("RefreshLock", "existing_id does not match stored lock"));
        }
    }
    set_lock(registry, absolute_path, chroot_rel, new_record)
}

/// `Unlock` (spec §4.6): requires a matching `lock_id` and holder, then
/// releases the kernel `flock` on the fd this process has been holding
/// since `SetLock` (falling back to a best-effort open-and-unlock if this
/// process isn't the one holding it, e.g. after a restart) and deletes the
/// xattr.
pub fn unlock(registry: &LockRegistry, absolute_path: &Path, chroot_rel: &str, record: &AdvisoryLockRecord) -> Result<()> {
    let existing = get_lock(absolute_path, chroot_rel)?;
    if existing.lock_id != record.lock_id || !existing.holder.matches(&record.holder) {
        return Err(DriverError::PermissionDenied { op: "Unlock", path: chroot_rel.to_string() });
    }

    if let Some(file) = registry.release(absolute_path) {
        let _ = flock(file.as_fd(), FlockArg::UnlockNonblock);
    } else if let Ok(file) = File::open(absolute_path) {
        let _ = flock(file.as_fd(), FlockArg::UnlockNonblock);
    }
    xattr_store::remove(absolute_path, LOCK_XATTR_KEY, "Unlock", chroot_rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn record(id: &str, holder: LockHolder, ttl_secs: i64) -> AdvisoryLockRecord {
        AdvisoryLockRecord { lock_id: id.to_string(), lock_type: LockType::Exclusive, holder, expiration_seconds: now_seconds() + ttl_secs }
    }

    #[test]
    fn lock_lifecycle_round_trips() {
        let registry = LockRegistry::new();
        let file = NamedTempFile::new().unwrap();
        let holder = LockHolder { user: None, app_name: Some("app-a".to_string()) };
        let rec = record("x", holder.clone(), 60);

        set_lock(&registry, file.path(), "f", &rec).unwrap();
        let fetched = get_lock(file.path(), "f").unwrap();
        assert_eq!(fetched.lock_id, "x");
        assert_eq!(fetched.holder, holder);

        unlock(&registry, file.path(), "f", &rec).unwrap();
        assert!(get_lock(file.path(), "f").is_err());
    }

    #[test]
    fn expired_lock_reads_as_not_found_and_self_heals() {
        let registry = LockRegistry::new();
        let file = NamedTempFile::new().unwrap();
        let holder = LockHolder { user: Some("alice".to_string()), app_name: None };
        let rec = record("x", holder, -1);
        set_lock(&registry, file.path(), "f", &rec).unwrap();
        assert!(matches!(get_lock(file.path(), "f"), Err(DriverError::NotFound { .. })));
        // The expired xattr is cleaned up by the failed GetLock above.
        assert!(xattr_store::get(file.path(), LOCK_XATTR_KEY, "Test", "f").unwrap().is_none());
    }

    #[test]
    fn refresh_requires_matching_holder() {
        let registry = LockRegistry::new();
        let file = NamedTempFile::new().unwrap();
        let holder_a = LockHolder { user: Some("alice".to_string()), app_name: None };
        let holder_b = LockHolder { user: Some("bob".to_string()), app_name: None };
        set_lock(&registry, file.path(), "f", &record("x", holder_a, 60)).unwrap();
        let attempt = refresh_lock(&registry, file.path(), "f", &record("x", holder_b, 60), None);
        assert!(matches!(attempt, Err(DriverError::PermissionDenied { .. })));
    }

    /// Spec §5: the flock is held for the grant's lifetime, so a second
    /// `SetLock` against the same open file description fails rather than
    /// silently overwriting the first grant's kernel lock.
    #[test]
    fn competing_set_lock_on_a_held_file_is_rejected() {
        let registry = LockRegistry::new();
        let file = NamedTempFile::new().unwrap();
        let holder = LockHolder { user: Some("alice".to_string()), app_name: None };
        set_lock(&registry, file.path(), "f", &record("x", holder.clone(), 60)).unwrap();

        // A second, independently-opened fd competing for the same flock
        // must be rejected while the first grant's fd is still held.
        let competing = OpenOptions::new().read(true).write(true).open(file.path()).unwrap();
        let result = flock(competing.as_fd(), FlockArg::LockExclusiveNonblock);
        assert!(result.is_err());

        // And the driver-level API rejects a second SetLock the same way.
        let other_registry = LockRegistry::new();
        let second_attempt = set_lock(&other_registry, file.path(), "f", &record("y", holder, 60));
        assert!(second_attempt.is_err());
    }
}
