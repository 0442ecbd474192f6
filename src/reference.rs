//! Resource references: either an external path or an opaque-ID reference.

use crate::error::{DriverError, Result};

/// A reference to a resource, as supplied by a caller.
///
/// Exactly one variant is meaningful; constructing a reference always goes
/// through one of the two constructors below so an invalid "both tags
/// populated" state is unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceReference {
    /// An external, user-visible path, e.g. `/projects/a.txt`.
    Path(String),
    /// An opaque resource ID scoped to a storage space.
    ResourceId {
        /// Identifier of the storage space the ID is scoped to.
        storage_id: String,
        /// Decimal inode number, as a string.
        opaque_id: String,
    },
}

impl ResourceReference {
    /// Builds a path reference, rejecting empty paths.
    pub fn path(external_path: impl Into<String>) -> Result<Self> {
        let external_path = external_path.into();
        if external_path.is_empty() {
            return Err(DriverError::bad_request("Reference", "empty path"));
        }
        Ok(ResourceReference::Path(external_path))
    }

    /// Builds an ID reference, rejecting an empty opaque ID.
    pub fn resource_id(storage_id: impl Into<String>, opaque_id: impl Into<String>) -> Result<Self> {
        let opaque_id = opaque_id.into();
        if opaque_id.is_empty() {
            return Err(DriverError::bad_request("Reference", "empty opaque id"));
        }
        Ok(ResourceReference::ResourceId { storage_id: storage_id.into(), opaque_id })
    }

    /// Returns the external path if this is a `Path` reference.
    pub fn as_path(&self) -> Option<&str> {
        match self {
            ResourceReference::Path(p) => Some(p),
            ResourceReference::ResourceId { .. } => None,
        }
    }
}
