//! `uid`/`gid` <-> name resolution, used by the resource info builder
//! (spec §4.5) and the grants subsystem (spec §4.6).
//!
//! Uses `nix::unistd::{User, Group}`, which wrap `getpwuid_r(3)` and
//! `getgrgid_r(3)` — already a teacher dependency (`nix`'s `user` feature)
//! — rather than hand-parsing `/etc/passwd`/`/etc/group`.

use nix::unistd::{Gid, Group, Uid, User};

/// Best-effort `uid -> username`. Returns `None` if the uid has no
/// passwd-database entry (spec §4.5: "best-effort; missing -> empty").
pub fn username_for_uid(uid: u32) -> Option<String> {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => Some(user.name),
        Ok(None) | Err(_) => None,
    }
}

/// Best-effort `gid -> group name`.
pub fn groupname_for_gid(gid: u32) -> Option<String> {
    match Group::from_gid(Gid::from_raw(gid)) {
        Ok(Some(group)) => Some(group.name),
        Ok(None) | Err(_) => None,
    }
}

/// Resolves a username to its numeric uid, used by `AddGrant`/`UpdateGrant`
/// (spec §4.6) to turn a grantee name into the `u:<uid>:<rwx>` `setfacl`
/// entry.
pub fn uid_for_username(username: &str) -> Option<u32> {
    match User::from_name(username) {
        Ok(Some(user)) => Some(user.uid.as_raw()),
        Ok(None) | Err(_) => None,
    }
}

/// Resolves a group name to its numeric gid, used the same way for
/// `g:<gid>:<rwx>` entries.
pub fn gid_for_groupname(groupname: &str) -> Option<u32> {
    match Group::from_name(groupname) {
        Ok(Some(group)) => Some(group.gid.as_raw()),
        Ok(None) | Err(_) => None,
    }
}
