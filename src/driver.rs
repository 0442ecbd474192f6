//! The driver itself (spec §6): composes the path translator, chroot jail,
//! user thread pool, and configuration into the single entry point the
//! host service talks to.

use std::sync::Arc;

use log::info;

use crate::chroot::ChrootJail;
use crate::config::{self, DriverConfig, MountDescriptor};
use crate::error::{DriverError, Result};
use crate::identity::UserIdentity;
use crate::locks::LockRegistry;
use crate::path::PathTranslator;
use crate::privilege::{self, PrivilegeProbeResult};
use crate::reference::ResourceReference;
use crate::thread_pool::{CancelToken, UserThreadPool};

/// Everything an operation needs about the call it's serving, in place of
/// ambient context-value smuggling (spec §9).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: UserIdentity,
    pub cancel: CancelToken,
}

impl RequestContext {
    pub fn new(user: UserIdentity) -> Self {
        RequestContext { user, cancel: CancelToken::new() }
    }
}

/// The per-user chrooted POSIX filesystem gateway (spec §1, §6).
///
/// Construction performs I/O (opening the chroot root, probing privilege)
/// and is expected to happen once at process startup; failures here are
/// fatal (spec §7).
pub struct CephMountDriver {
    pub(crate) translator: PathTranslator,
    pub(crate) jail: ChrootJail,
    pub(crate) pool: Arc<UserThreadPool>,
    pub(crate) lock_registry: Arc<LockRegistry>,
    pub(crate) config: DriverConfig,
    #[cfg(feature = "mds-inode-resolve")]
    pub(crate) fs_name: Option<String>,
}

impl std::fmt::Debug for CephMountDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CephMountDriver")
            .field("jail_root", &self.jail.root())
            .field("pool", &self.pool)
            .finish()
    }
}

impl CephMountDriver {
    /// Builds the driver from a [`DriverConfig`], parsing `fstabentry` into
    /// a [`MountDescriptor`] unless `testing_allow_local_mode` is set.
    pub fn new(config: DriverConfig) -> Result<Self> {
        let mount = match &config.fstabentry {
            Some(line) => Some(MountDescriptor::parse_fstab_entry(line)?),
            None => None,
        };

        let root = config::resolve_effective_root(&config, mount.as_ref())?;
        let jail = ChrootJail::open(&root)?;
        info!("cephmount driver: chroot jail opened at {}", jail.root().display());

        let translator = match &mount {
            Some(mount) => PathTranslator::new(mount),
            None => PathTranslator::identity(),
        };

        let privilege_result = privilege::probe_privileges(config.nobody_uid as u32, config.nobody_gid as u32);
        let pool = UserThreadPool::new(
            config.thread_ttl,
            config.cleanup_period,
            config.nobody_uid as i64,
            config.nobody_gid as i64,
            privilege_result,
        );

        Ok(CephMountDriver {
            translator,
            jail,
            pool,
            lock_registry: Arc::new(LockRegistry::new()),
            config,
            #[cfg(feature = "mds-inode-resolve")]
            fs_name: None,
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn privilege_result(&self) -> &PrivilegeProbeResult {
        self.pool.privilege_result()
    }

    /// Resolves a [`ResourceReference`] to a chroot-relative path, running
    /// the containment check (spec §4.6 steps 1-3). ID references require
    /// the `mds-inode-resolve` feature.
    pub(crate) fn resolve_reference(&self, reference: &ResourceReference, op: &'static str) -> Result<String> {
        match reference {
            ResourceReference::Path(external) => self.translator.to_chroot(external),
            ResourceReference::ResourceId { opaque_id, .. } => self.resolve_id_reference(opaque_id, op),
        }
    }

    #[cfg(feature = "mds-inode-resolve")]
    fn resolve_id_reference(&self, opaque_id: &str, _op: &'static str) -> Result<String> {
        let external = crate::inode_resolver::resolve_inode_to_path(&self.translator, opaque_id)?;
        self.translator.to_chroot(&external)
    }

    #[cfg(not(feature = "mds-inode-resolve"))]
    fn resolve_id_reference(&self, _opaque_id: &str, op: &'static str) -> Result<String> {
        Err(DriverError::NotSupported { op })
    }

    /// `GetPathByID` (spec §6): the public surface for resolving an opaque
    /// ID reference back to an external path.
    pub fn get_path_by_id(&self, ctx: &RequestContext, storage_id: &str, opaque_id: &str) -> Result<String> {
        let reference = ResourceReference::resource_id(storage_id, opaque_id)?;
        let chroot_rel = self.resolve_reference(&reference, "GetPathByID")?;
        let _ = &ctx.user;
        Ok(self.translator.from_chroot(&chroot_rel))
    }

    /// `Shutdown` (spec §6): drains and joins the thread pool. Idempotent.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}
