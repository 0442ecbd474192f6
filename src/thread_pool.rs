//! User thread pool: one dedicated OS thread per `(uid, gid)` with its
//! fs-credentials preset once at creation, modeled on a
//! worker-pool-with-idle-eviction shape similar to `session_mt.rs`, but
//! keyed by identity rather than by FUSE request concurrency and using
//! synchronous hand-off instead of a kernel device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::error::{DriverError, Result};
use crate::identity::UserIdentity;
use crate::privilege::PrivilegeProbeResult;

/// A boxed unit of work already bound to its reply channel; see
/// [`UserThreadPool::execute`].
type Job = Box<dyn FnOnce() + Send + 'static>;

/// `(uid, gid)` after the identity mapping rule; keys the thread pool.
pub type PoolKey = (i64, i64);

/// Cooperative cancellation signal threaded through a [`crate::RequestContext`].
///
/// Observed before dispatch it prevents the work from running at all; once
/// work is in flight it is advisory only (syscalls on network filesystems
/// are not reliably interruptible).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct UserThread {
    owner_uid: i64,
    owner_gid: i64,
    sender: mpsc::Sender<Job>,
    handle: JoinHandle<()>,
    last_used_at: Arc<Mutex<Instant>>,
}

impl UserThread {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

fn spawn_user_thread(uid: i64, gid: i64) -> UserThread {
    let (sender, receiver) = mpsc::channel::<Job>();
    let last_used_at = Arc::new(Mutex::new(Instant::now()));
    let last_used_at_for_thread = Arc::clone(&last_used_at);

    let handle = thread::Builder::new()
        .name(format!("cephmount-u{uid}-g{gid}"))
        .spawn(move || {
            set_thread_fs_identity(uid, gid);
            while let Ok(job) = receiver.recv() {
                job();
                *last_used_at_for_thread.lock() = Instant::now();
            }
            debug!("user thread for uid={uid} gid={gid} exiting");
        })
        .expect("failed to spawn user thread");

    UserThread { owner_uid: uid, owner_gid: gid, sender, handle, last_used_at }
}

/// Sets this OS thread's `fsuid`/`fsgid` once, for the thread's entire
/// lifetime. The thread is exclusive to its user, so the credentials are
/// never restored once applied.
fn set_thread_fs_identity(uid: i64, gid: i64) {
    // SAFETY: setfsuid/setfsgid are always safe to call; they affect only
    // the calling thread's fs-identity and cannot fault.
    let observed_uid = unsafe { libc::setfsuid(uid as libc::uid_t) };
    let _ = observed_uid;
    let confirmed_uid = unsafe { libc::setfsuid(u32::MAX as libc::uid_t) } as i64;
    if confirmed_uid != uid {
        warn!(
            "user thread for uid={uid} gid={gid} could not set fsuid (insufficient privilege); running under process credentials (observed fsuid={confirmed_uid})"
        );
    }

    // SAFETY: see above.
    unsafe { libc::setfsgid(gid as libc::gid_t) };
    let confirmed_gid = unsafe { libc::setfsgid(u32::MAX as libc::gid_t) } as i64;
    if confirmed_gid != gid {
        warn!(
            "user thread for uid={uid} gid={gid} could not set fsgid (insufficient privilege); running under process credentials (observed fsgid={confirmed_gid})"
        );
    }
}

struct PoolInner {
    threads: HashMap<PoolKey, UserThread>,
}

impl std::fmt::Debug for UserThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserThreadPool")
            .field("active_threads", &self.inner.lock().threads.len())
            .field("ttl", &self.ttl)
            .field("privilege_level", &self.privilege_result.level())
            .finish()
    }
}

/// The user thread pool. Owns a set of OS threads, one per active
/// `(uid, gid)`, and a janitor that evicts idle ones.
pub struct UserThreadPool {
    inner: Mutex<PoolInner>,
    ttl: Duration,
    nobody_uid: i64,
    nobody_gid: i64,
    privilege_result: PrivilegeProbeResult,
    shutdown: Arc<AtomicBool>,
    janitor_exit: Arc<(Mutex<bool>, Condvar)>,
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl UserThreadPool {
    pub fn new(
        ttl: Duration,
        cleanup_period: Duration,
        nobody_uid: i64,
        nobody_gid: i64,
        privilege_result: PrivilegeProbeResult,
    ) -> Arc<Self> {
        let pool = Arc::new(UserThreadPool {
            inner: Mutex::new(PoolInner { threads: HashMap::new() }),
            ttl,
            nobody_uid,
            nobody_gid,
            privilege_result,
            shutdown: Arc::new(AtomicBool::new(false)),
            janitor_exit: Arc::new((Mutex::new(false), Condvar::new())),
            janitor: Mutex::new(None),
        });

        let janitor_pool = Arc::clone(&pool);
        let janitor_exit = Arc::clone(&pool.janitor_exit);
        let handle = thread::Builder::new()
            .name("cephmount-pool-janitor".to_string())
            .spawn(move || {
                let (lock, cvar) = &*janitor_exit;
                let mut exiting = lock.lock();
                loop {
                    let result = cvar.wait_for(&mut exiting, cleanup_period);
                    if *exiting {
                        break;
                    }
                    if !result.timed_out() {
                        continue;
                    }
                    janitor_pool.evict_idle();
                }
            })
            .expect("failed to spawn pool janitor thread");
        *pool.janitor.lock() = Some(handle);

        pool
    }

    /// Returns this pool's privilege probe result, e.g. for a readiness
    /// endpoint.
    pub fn privilege_result(&self) -> &PrivilegeProbeResult {
        &self.privilege_result
    }

    fn evict_idle(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let mut to_remove = Vec::new();
        for (key, thread) in inner.threads.iter() {
            let idle = now.duration_since(*thread.last_used_at.lock());
            if idle > self.ttl {
                to_remove.push(*key);
            }
        }
        let mut removed = Vec::new();
        for key in to_remove {
            if let Some(thread) = inner.threads.remove(&key) {
                removed.push(thread);
            }
        }
        // Drop the map lock before joining so the janitor never blocks
        // other callers' map mutations while a thread winds down.
        drop(inner);
        for thread in removed {
            debug!("evicting idle user thread uid={} gid={}", thread.owner_uid, thread.owner_gid);
            drop(thread.sender);
            let _ = thread.handle.join();
        }
    }

    /// Runs `work` on the OS thread dedicated to `identity`'s mapped
    /// `(uid, gid)`, creating that thread on first use. The caller awaits
    /// completion synchronously; there is no async handoff.
    pub fn execute<F, T>(&self, identity: &UserIdentity, cancel: &CancelToken, op: &'static str, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(DriverError::ShutdownInProgress);
        }
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled { op });
        }

        let (uid, gid) = identity.thread_pool_key(self.nobody_uid, self.nobody_gid);
        let sender = {
            let mut inner = self.inner.lock();
            let needs_new = match inner.threads.get(&(uid, gid)) {
                Some(thread) if thread.is_alive() => false,
                Some(_) => {
                    warn!("user thread for uid={uid} gid={gid} died (likely panicked); replacing it");
                    true
                }
                None => true,
            };
            if needs_new {
                inner.threads.insert((uid, gid), spawn_user_thread(uid, gid));
                info!("created user thread for uid={uid} gid={gid}");
            }
            inner.threads.get(&(uid, gid)).expect("just inserted").sender.clone()
        };

        let (reply_tx, reply_rx) = mpsc::channel::<Result<T>>();
        let job: Job = Box::new(move || {
            let result = work();
            let _ = reply_tx.send(result);
        });

        sender
            .send(job)
            .map_err(|_| DriverError::bad_request(op, "user thread pool is shutting down"))?;

        reply_rx
            .recv()
            .map_err(|_| DriverError::bad_request(op, "user thread exited before completing work"))?
    }

    /// Closes all queues, joins all threads, and makes further
    /// [`Self::execute`] calls fail with `ShutdownInProgress`.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        {
            let (lock, cvar) = &*self.janitor_exit;
            *lock.lock() = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.janitor.lock().take() {
            let _ = handle.join();
        }

        let threads: Vec<UserThread> = {
            let mut inner = self.inner.lock();
            inner.threads.drain().map(|(_, v)| v).collect()
        };
        for thread in threads {
            drop(thread.sender);
            let _ = thread.handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserIdentity;
    use std::sync::atomic::AtomicI64;
    use std::time::Duration;

    fn user(uid: i64, gid: i64) -> UserIdentity {
        UserIdentity {
            opaque_id: "x".into(),
            idp: "idp".into(),
            username: format!("user{uid}"),
            uid,
            gid,
            groups: Vec::new(),
        }
    }

    fn probe_stub() -> PrivilegeProbeResult {
        PrivilegeProbeResult {
            current_uid: 0,
            current_gid: 0,
            current_fsuid: 0,
            current_fsgid: 0,
            can_change_uid: false,
            can_change_gid: false,
            tested_uids: vec![],
            tested_gids: vec![],
            errors: vec![],
            recommendations: vec![],
        }
    }

    #[test]
    fn same_key_calls_serialize() {
        let pool = UserThreadPool::new(Duration::from_secs(60), Duration::from_secs(5), 65534, 65534, probe_stub());
        let counter = Arc::new(AtomicI64::new(0));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let pool = Arc::clone(&pool);
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                pool.execute(&user(4000, 4000), &CancelToken::new(), "Test", move || {
                    let before = counter.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(before + 1, counter.load(Ordering::SeqCst));
                    Ok(())
                })
            }));
        }
        for h in handles {
            h.join().unwrap().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        pool.shutdown();
    }

    #[test]
    fn shutdown_rejects_further_submissions() {
        let pool = UserThreadPool::new(Duration::from_secs(60), Duration::from_secs(5), 65534, 65534, probe_stub());
        pool.shutdown();
        let result = pool.execute(&user(4001, 4001), &CancelToken::new(), "Test", || Ok::<(), DriverError>(()));
        assert!(matches!(result, Err(DriverError::ShutdownInProgress)));
    }

    #[test]
    fn cancel_before_dispatch_skips_work() {
        let pool = UserThreadPool::new(Duration::from_secs(60), Duration::from_secs(5), 65534, 65534, probe_stub());
        let cancel = CancelToken::new();
        cancel.cancel();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        let result = pool.execute(&user(4002, 4002), &cancel, "Test", move || {
            ran_clone.store(true, Ordering::SeqCst);
            Ok::<(), DriverError>(())
        });
        assert!(result.is_err());
        assert!(!ran.load(Ordering::SeqCst));
        pool.shutdown();
    }
}
