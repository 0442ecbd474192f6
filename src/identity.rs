//! Authenticated user identity and the UID/GID mapping rule (spec §3).

/// An authenticated user, as handed to every operation via
/// [`crate::RequestContext`].
///
/// Identity is immutable for the lifetime of a request; the `(uid, gid)`
/// pair produced by [`UserIdentity::thread_pool_key`] is what keys the
/// thread pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Opaque identifier from the identity provider.
    pub opaque_id: String,
    /// Identity provider name.
    pub idp: String,
    /// Human-readable username.
    pub username: String,
    /// Numeric UID as declared by the identity provider.
    pub uid: i64,
    /// Numeric GID as declared by the identity provider.
    pub gid: i64,
    /// Supplementary group names.
    pub groups: Vec<String>,
}

/// Default GID/UID used for the sentinel `(1000, 1000)` mapping (spec §3,
/// §9 open question: this sentinel is preserved verbatim from the source
/// behavior; see `DESIGN.md` for the open-question decision).
const UNDECLARED_UID_SENTINEL: (i64, i64) = (1000, 1000);

impl UserIdentity {
    /// Applies the UID/GID mapping rule (spec §3) to produce the
    /// `(uid, gid)` pair that keys the thread pool.
    ///
    /// - `username == "root"` maps to `(0, 0)`.
    /// - `username == "nobody"` maps to the configured nobody uid/gid.
    /// - a named non-root user who declared `uid == 0 && gid == 0` (i.e.
    ///   never declared numeric IDs) maps to the `(1000, 1000)` sentinel.
    /// - otherwise the declared `(uid, gid)` is used unchanged.
    pub fn thread_pool_key(&self, nobody_uid: i64, nobody_gid: i64) -> (i64, i64) {
        if self.username == "root" {
            (0, 0)
        } else if self.username == "nobody" {
            (nobody_uid, nobody_gid)
        } else if self.uid == 0 && self.gid == 0 {
            UNDECLARED_UID_SENTINEL
        } else {
            (self.uid, self.gid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: &str, uid: i64, gid: i64) -> UserIdentity {
        UserIdentity {
            opaque_id: "abc".into(),
            idp: "idp.example.org".into(),
            username: username.into(),
            uid,
            gid,
            groups: Vec::new(),
        }
    }

    #[test]
    fn root_maps_to_zero_zero() {
        assert_eq!(user("root", 4242, 4242).thread_pool_key(65534, 65534), (0, 0));
    }

    #[test]
    fn nobody_maps_to_configured_nobody() {
        assert_eq!(
            user("nobody", 0, 0).thread_pool_key(65534, 65534),
            (65534, 65534)
        );
    }

    #[test]
    fn undeclared_numeric_ids_map_to_sentinel() {
        assert_eq!(
            user("alice", 0, 0).thread_pool_key(65534, 65534),
            UNDECLARED_UID_SENTINEL
        );
    }

    #[test]
    fn declared_ids_pass_through() {
        assert_eq!(user("alice", 3001, 3001).thread_pool_key(65534, 65534), (3001, 3001));
    }
}
