//! Error taxonomy exposed across the driver boundary (spec §7).
//!
//! Every operation maps the syscalls it performs onto one of these kinds;
//! callers match on kind, never on the underlying message or errno.

use std::io;

/// A typed error returned by any operation on [`crate::CephMountDriver`].
///
/// The `path` field is always the chroot-relative path (never the absolute
/// local mount path, which is an implementation detail that must not leak
/// across the boundary).
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The target of the operation does not exist.
    #[error("{op}: not found: {path}")]
    NotFound {
        /// Name of the operation that failed, e.g. `"GetMD"`.
        op: &'static str,
        /// Chroot-relative path the operation was resolved to.
        path: String,
    },

    /// The operation is recognized but intentionally unimplemented (spec §4.7).
    #[error("{op}: not supported")]
    NotSupported {
        /// Name of the operation that failed.
        op: &'static str,
    },

    /// The kernel, or a containment check, refused the operation.
    #[error("{op}: permission denied: {path}")]
    PermissionDenied {
        /// Name of the operation that failed.
        op: &'static str,
        /// Chroot-relative path the operation was resolved to.
        path: String,
    },

    /// The caller-supplied reference or payload was malformed.
    #[error("{op}: bad request: {reason}")]
    BadRequest {
        /// Name of the operation that failed.
        op: &'static str,
        /// Human-readable explanation.
        reason: String,
    },

    /// Any other syscall or subsystem failure; the cause is preserved.
    #[error("{op}: internal error on {path}: {source}")]
    Internal {
        /// Name of the operation that failed.
        op: &'static str,
        /// Chroot-relative path the operation was resolved to.
        path: String,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// A download returned less data than requested and cannot be completed.
    #[error("{op}: partial content: {path}")]
    PartialContent {
        /// Name of the operation that failed.
        op: &'static str,
        /// Chroot-relative path the operation was resolved to.
        path: String,
    },

    /// An upload's checksum did not match the one supplied by the caller.
    #[error("{op}: checksum mismatch: {path}")]
    ChecksumMismatch {
        /// Name of the operation that failed.
        op: &'static str,
        /// Chroot-relative path the operation was resolved to.
        path: String,
    },

    /// The thread pool is shutting down and rejects further submissions.
    #[error("shutdown in progress")]
    ShutdownInProgress,

    /// Cancellation was observed before dispatch (spec §5); the work never
    /// ran. Not part of the closed §7 boundary taxonomy, but spec §5 names
    /// this outcome explicitly, so it gets its own kind rather than being
    /// folded into `BadRequest`.
    #[error("{op}: cancelled before dispatch")]
    Cancelled {
        /// Name of the operation that was cancelled.
        op: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, DriverError>;

impl DriverError {
    /// Wraps a raw `io::Error` from a syscall, mapping its errno onto the
    /// taxonomy per spec §7 (`ENOENT` -> NotFound, `EACCES`/`EPERM` ->
    /// PermissionDenied, `ENOSYS` -> NotSupported, else -> Internal).
    pub fn from_io(op: &'static str, path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        match err.raw_os_error() {
            Some(libc::ENOENT) => DriverError::NotFound { op, path },
            Some(libc::EACCES) | Some(libc::EPERM) => DriverError::PermissionDenied { op, path },
            Some(libc::ENOSYS) => DriverError::NotSupported { op },
            _ => DriverError::Internal { op, path, source: err },
        }
    }

    /// Wraps a `nix::Error` the same way `from_io` wraps `io::Error`.
    pub fn from_nix(op: &'static str, path: impl Into<String>, err: nix::Error) -> Self {
        Self::from_io(op, path, io::Error::from(err))
    }

    /// Builds a `PermissionDenied` for a containment-check rejection, which
    /// never reaches a syscall (spec §8 invariant 2).
    pub fn containment(op: &'static str, path: impl Into<String>) -> Self {
        DriverError::PermissionDenied { op, path: path.into() }
    }

    /// Builds a `BadRequest` for a malformed reference or payload.
    pub fn bad_request(op: &'static str, reason: impl Into<String>) -> Self {
        DriverError::BadRequest { op, reason: reason.into() }
    }

    /// Returns the stable taxonomy kind name, e.g. for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            DriverError::NotFound { .. } => "NotFound",
            DriverError::NotSupported { .. } => "NotSupported",
            DriverError::PermissionDenied { .. } => "PermissionDenied",
            DriverError::BadRequest { .. } => "BadRequest",
            DriverError::Internal { .. } => "Internal",
            DriverError::PartialContent { .. } => "PartialContent",
            DriverError::ChecksumMismatch { .. } => "ChecksumMismatch",
            DriverError::ShutdownInProgress => "ShutdownInProgress",
            DriverError::Cancelled { .. } => "Cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enoent_maps_to_not_found() {
        let err = DriverError::from_io("GetMD", "foo.txt", io::Error::from_raw_os_error(libc::ENOENT));
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn eacces_and_eperm_map_to_permission_denied() {
        for errno in [libc::EACCES, libc::EPERM] {
            let err = DriverError::from_io("Delete", "foo", io::Error::from_raw_os_error(errno));
            assert_eq!(err.kind(), "PermissionDenied");
        }
    }

    #[test]
    fn enosys_maps_to_not_supported() {
        let err = DriverError::from_io("ListRecycle", "x", io::Error::from_raw_os_error(libc::ENOSYS));
        assert_eq!(err.kind(), "NotSupported");
    }

    #[test]
    fn other_errno_maps_to_internal() {
        let err = DriverError::from_io("Move", "x", io::Error::from_raw_os_error(libc::EIO));
        assert_eq!(err.kind(), "Internal");
    }
}
