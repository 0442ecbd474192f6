//! Resource info builder: turns a chroot-relative path plus a `stat(2)`
//! result into the public `ResourceInfo` record.

use std::collections::HashMap;
use std::fs::Metadata;
use std::os::unix::fs::{FileTypeExt, MetadataExt};

use bitflags::bitflags;

use crate::passwd;
use crate::path::PathTranslator;

/// Type of a filesystem entry, as exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    File,
    Directory,
    Symlink,
}

bitflags! {
    /// Advertised capability set for a resource.
    ///
    /// Permission enforcement happens at the kernel (fsuid/fsgid) level, so
    /// this driver always advertises the *maximum* set for any resource it
    /// can stat; the kernel refuses any syscall the caller actually lacks
    /// permission for. 20 bits wide; bit 20 (`RESERVED`) is unused today and
    /// kept so the representation matches the documented width (see
    /// `DESIGN.md`: open question on the exact 20th bit).
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
    pub struct PermissionSet: u32 {
        const STAT                  = 1 << 0;
        const GET_PATH               = 1 << 1;
        const GET_QUOTA               = 1 << 2;
        const INITIATE_UPLOAD         = 1 << 3;
        const INITIATE_DOWNLOAD       = 1 << 4;
        const LIST_GRANTS             = 1 << 5;
        const LIST_CONTAINER          = 1 << 6;
        const LIST_RECYCLE            = 1 << 7;
        const LIST_VERSIONS           = 1 << 8;
        const CREATE_CONTAINER        = 1 << 9;
        const DELETE                  = 1 << 10;
        const MOVE                    = 1 << 11;
        const PURGE_RECYCLE           = 1 << 12;
        const RESTORE_VERSION         = 1 << 13;
        const RESTORE_RECYCLE_ITEM    = 1 << 14;
        const ADD_GRANT                = 1 << 15;
        const REMOVE_GRANT            = 1 << 16;
        const UPDATE_GRANT            = 1 << 17;
        const DENY_GRANT              = 1 << 18;
        const RESERVED                = 1 << 19;
    }
}

impl PermissionSet {
    /// The fixed maximum set every `ResourceInfo` advertises.
    pub fn maximum() -> Self {
        PermissionSet::STAT
            | PermissionSet::GET_PATH
            | PermissionSet::GET_QUOTA
            | PermissionSet::INITIATE_UPLOAD
            | PermissionSet::INITIATE_DOWNLOAD
            | PermissionSet::LIST_GRANTS
            | PermissionSet::LIST_CONTAINER
            | PermissionSet::LIST_RECYCLE
            | PermissionSet::LIST_VERSIONS
            | PermissionSet::CREATE_CONTAINER
            | PermissionSet::DELETE
            | PermissionSet::MOVE
            | PermissionSet::PURGE_RECYCLE
            | PermissionSet::RESTORE_VERSION
            | PermissionSet::RESTORE_RECYCLE_ITEM
            | PermissionSet::ADD_GRANT
            | PermissionSet::REMOVE_GRANT
            | PermissionSet::UPDATE_GRANT
            | PermissionSet::DENY_GRANT
    }

    /// Read capabilities, per the RWX<->capability mapping.
    pub fn read_caps() -> Self {
        PermissionSet::STAT
            | PermissionSet::GET_PATH
            | PermissionSet::GET_QUOTA
            | PermissionSet::LIST_GRANTS
            | PermissionSet::INITIATE_DOWNLOAD
    }

    /// Write capabilities, per the RWX<->capability mapping.
    pub fn write_caps() -> Self {
        PermissionSet::CREATE_CONTAINER
            | PermissionSet::DELETE
            | PermissionSet::INITIATE_UPLOAD
            | PermissionSet::MOVE
            | PermissionSet::PURGE_RECYCLE
            | PermissionSet::RESTORE_VERSION
            | PermissionSet::RESTORE_RECYCLE_ITEM
            | PermissionSet::ADD_GRANT
            | PermissionSet::UPDATE_GRANT
            | PermissionSet::REMOVE_GRANT
            | PermissionSet::DENY_GRANT
    }

    /// Execute capabilities, per the RWX<->capability mapping.
    pub fn execute_caps() -> Self {
        PermissionSet::LIST_RECYCLE | PermissionSet::LIST_CONTAINER | PermissionSet::LIST_VERSIONS
    }

    /// Maps this capability set to an `rwx` string: `r` if it contains any
    /// read capability, `w` if any write capability, `x` if any execute
    /// capability.
    pub fn to_rwx_string(self) -> String {
        let mut s = String::with_capacity(3);
        s.push(if self.intersects(Self::read_caps()) { 'r' } else { '-' });
        s.push(if self.intersects(Self::write_caps()) { 'w' } else { '-' });
        s.push(if self.intersects(Self::execute_caps()) { 'x' } else { '-' });
        s
    }

    /// Builds a capability set from an `rwx` string, the inverse of
    /// [`Self::to_rwx_string`].
    pub fn from_rwx_str(s: &str) -> Self {
        let mut caps = PermissionSet::empty();
        let bytes = s.as_bytes();
        if bytes.first() == Some(&b'r') {
            caps |= Self::read_caps();
        }
        if bytes.get(1) == Some(&b'w') {
            caps |= Self::write_caps();
        }
        if bytes.get(2) == Some(&b'x') {
            caps |= Self::execute_caps();
        }
        caps
    }
}

/// The public, stable description of a filesystem entry.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub resource_type: ResourceType,
    /// Decimal string of the backing inode number.
    pub opaque_id: String,
    /// Byte size; 0 for directories and symlinks.
    pub size: u64,
    pub mtime_seconds: i64,
    /// Best-effort `uid -> username` resolution; empty if unresolved.
    pub owner_username: String,
    pub external_path: String,
    /// Empty for directories.
    pub mime_type: String,
    pub symlink_target: Option<String>,
    pub permission_set: PermissionSet,
    pub arbitrary_metadata: HashMap<String, String>,
}

/// Builds a [`ResourceInfo`] from a chroot-relative path and its
/// already-collected `stat(2)`/`lstat(2)` result.
///
/// `readlink_target` must be supplied by the caller when `meta` describes a
/// symlink: the builder itself does not perform I/O so that it stays a pure
/// function of its inputs (the jail is the only thing allowed to touch the
/// filesystem).
pub fn build_resource_info(
    translator: &PathTranslator,
    chroot_rel: &str,
    meta: &Metadata,
    readlink_target: Option<String>,
) -> ResourceInfo {
    let file_type = meta.file_type();
    let resource_type = if file_type.is_dir() {
        ResourceType::Directory
    } else if file_type.is_symlink() {
        ResourceType::Symlink
    } else {
        ResourceType::File
    };

    let size = match resource_type {
        ResourceType::File => meta.size(),
        ResourceType::Directory | ResourceType::Symlink => 0,
    };

    let mime_type = match resource_type {
        ResourceType::File => mime_guess::from_path(chroot_rel)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
        ResourceType::Directory | ResourceType::Symlink => String::new(),
    };

    let mut arbitrary_metadata = HashMap::with_capacity(2);
    arbitrary_metadata.insert("inode".to_string(), meta.ino().to_string());
    arbitrary_metadata.insert("device".to_string(), meta.dev().to_string());

    ResourceInfo {
        resource_type,
        opaque_id: meta.ino().to_string(),
        size,
        mtime_seconds: meta.mtime(),
        owner_username: passwd::username_for_uid(meta.uid()).unwrap_or_default(),
        external_path: translator.from_chroot(chroot_rel),
        mime_type,
        symlink_target: readlink_target,
        permission_set: PermissionSet::maximum(),
        arbitrary_metadata,
    }
}
