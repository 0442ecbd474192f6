//! Operations the surrounding gRPC service's interface requires but this
//! driver intentionally does not implement (spec §4.7). Each returns
//! `NotSupported` without resolving a reference or touching the thread
//! pool — there is no chroot-relative path or syscall involved.

use crate::error::{DriverError, Result};

macro_rules! unsupported_op {
    ($name:ident, $op:literal) => {
        pub fn $name() -> Result<()> {
            Err(DriverError::NotSupported { op: $op })
        }
    };
}

unsupported_op!(get_home, "GetHome");
unsupported_op!(create_home, "CreateHome");
unsupported_op!(create_storage_space, "CreateStorageSpace");
unsupported_op!(update_storage_space, "UpdateStorageSpace");
unsupported_op!(list_storage_spaces, "ListStorageSpaces");
unsupported_op!(list_revisions, "ListRevisions");
unsupported_op!(download_revision, "DownloadRevision");
unsupported_op!(restore_revision, "RestoreRevision");
unsupported_op!(list_recycle, "ListRecycle");
unsupported_op!(restore_recycle_item, "RestoreRecycleItem");
unsupported_op!(purge_recycle_item, "PurgeRecycleItem");
unsupported_op!(empty_recycle, "EmptyRecycle");
unsupported_op!(create_reference, "CreateReference");
