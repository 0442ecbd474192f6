//! Privilege prober (spec §4.1): determines at startup whether this
//! process can change `fsuid`/`fsgid` to arbitrary targets.

use log::{info, warn};

/// Classification of the process's ability to perform per-user isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeLevel {
    /// Both `fsuid` and `fsgid` can be changed to arbitrary targets.
    Sufficient,
    /// Exactly one of `fsuid`/`fsgid` can be changed.
    Partial,
    /// Neither can be changed; operations will run under the process's own
    /// credentials.
    Insufficient,
}

/// Result of probing the process's ability to change `fsuid`/`fsgid`
/// (spec §4.1).
#[derive(Debug, Clone)]
pub struct PrivilegeProbeResult {
    pub current_uid: u32,
    pub current_gid: u32,
    pub current_fsuid: u32,
    pub current_fsgid: u32,
    pub can_change_uid: bool,
    pub can_change_gid: bool,
    pub tested_uids: Vec<u32>,
    pub tested_gids: Vec<u32>,
    pub errors: Vec<String>,
    pub recommendations: Vec<String>,
}

impl PrivilegeProbeResult {
    pub fn level(&self) -> PrivilegeLevel {
        match (self.can_change_uid, self.can_change_gid) {
            (true, true) => PrivilegeLevel::Sufficient,
            (true, false) | (false, true) => PrivilegeLevel::Partial,
            (false, false) => PrivilegeLevel::Insufficient,
        }
    }
}

/// `setfsuid(2)`/`setfsgid(2)` accept the new value and return the
/// *previous* value, so reading back the effective id requires a
/// second call with an out-of-range probe value. `u32::MAX` is never a
/// valid id, so it safely reads back without changing anything.
const READBACK_PROBE: u32 = u32::MAX;

fn read_current_fsuid() -> u32 {
    // SAFETY: setfsuid with an invalid uid is a documented no-op read.
    unsafe { libc::setfsuid(READBACK_PROBE as libc::uid_t) as u32 }
}

fn read_current_fsgid() -> u32 {
    // SAFETY: setfsgid with an invalid gid is a documented no-op read.
    unsafe { libc::setfsgid(READBACK_PROBE as libc::gid_t) as u32 }
}

fn try_set_fsuid(uid: u32) -> u32 {
    // SAFETY: libc::setfsuid is always safe to call; it cannot fault.
    unsafe { libc::setfsuid(uid as libc::uid_t) as u32 }
}

fn try_set_fsgid(gid: u32) -> u32 {
    // SAFETY: libc::setfsgid is always safe to call; it cannot fault.
    unsafe { libc::setfsgid(gid as libc::gid_t) as u32 }
}

/// Probes whether this process can change `fsuid`/`fsgid` to arbitrary
/// targets, restoring the original values on every return path (spec
/// §4.1's hard requirement).
pub fn probe_privileges(nobody_uid: u32, nobody_gid: u32) -> PrivilegeProbeResult {
    let current_uid = nix::unistd::getuid().as_raw();
    let current_gid = nix::unistd::getgid().as_raw();
    let original_fsuid = read_current_fsuid();
    let original_fsgid = read_current_fsgid();

    let mut errors = Vec::new();
    let mut recommendations = Vec::new();

    // Sentinel probe id chosen to be distinct from current/nobody and
    // unlikely to collide with a real account.
    const SENTINEL_PROBE_UID: u32 = 1000;
    const SENTINEL_PROBE_GID: u32 = 1000;
    let tested_uids = vec![current_uid, nobody_uid, SENTINEL_PROBE_UID];
    let tested_gids = vec![current_gid, nobody_gid, SENTINEL_PROBE_GID];

    let mut can_change_uid = true;
    for &uid in &tested_uids {
        try_set_fsuid(uid);
        let observed = read_current_fsuid();
        if observed != uid {
            can_change_uid = false;
            errors.push(format!("setfsuid({uid}) did not take effect (observed {observed})"));
        }
    }

    let mut can_change_gid = true;
    for &gid in &tested_gids {
        try_set_fsgid(gid);
        let observed = read_current_fsgid();
        if observed != gid {
            can_change_gid = false;
            errors.push(format!("setfsgid({gid}) did not take effect (observed {observed})"));
        }
    }

    // Restore originals unconditionally, including on the error paths above.
    try_set_fsuid(original_fsuid);
    try_set_fsgid(original_fsgid);

    if !can_change_uid || !can_change_gid {
        recommendations.push(
            "grant CAP_SETUID and CAP_SETGID to this process (or run as root) to enable per-user filesystem isolation".to_string(),
        );
    }

    let result = PrivilegeProbeResult {
        current_uid,
        current_gid,
        current_fsuid: original_fsuid,
        current_fsgid: original_fsgid,
        can_change_uid,
        can_change_gid,
        tested_uids,
        tested_gids,
        errors,
        recommendations,
    };

    // Post-condition check: verify restoration actually happened.
    let final_fsuid = read_current_fsuid();
    let final_fsgid = read_current_fsgid();
    if final_fsuid != original_fsuid || final_fsgid != original_fsgid {
        log::error!(
            "privilege prober failed to restore original fsuid/fsgid: wanted ({original_fsuid}, {original_fsgid}), got ({final_fsuid}, {final_fsgid})"
        );
    }

    match result.level() {
        PrivilegeLevel::Sufficient => info!("privilege probe: per-user isolation is available (fsuid and fsgid are settable)"),
        PrivilegeLevel::Partial => warn!("privilege probe: only partial per-user isolation is available: {:?}", result.errors),
        PrivilegeLevel::Insufficient => warn!("privilege probe: per-user isolation is unavailable; operations will run under this process's own credentials: {:?}", result.errors),
    }

    result
}
