//! Concurrency scenarios (spec §8 invariant 3): distinct `(uid, gid)` pairs
//! run concurrently; identical pairs serialize in submission order.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cephmount_driver::identity::UserIdentity;
use cephmount_driver::privilege::PrivilegeProbeResult;
use cephmount_driver::thread_pool::{CancelToken, UserThreadPool};

fn user(uid: i64, gid: i64) -> UserIdentity {
    UserIdentity { opaque_id: "x".into(), idp: "idp".into(), username: format!("user{uid}"), uid, gid, groups: vec![] }
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
fn distinct_users_run_concurrently_same_user_serializes() {
    let pool = UserThreadPool::new(Duration::from_secs(60), Duration::from_secs(5), 65534, 65534, probe_stub());

    // Same-key submissions must never interleave.
    let serial_counter = Arc::new(AtomicI64::new(0));
    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = Arc::clone(&pool);
        let counter = Arc::clone(&serial_counter);
        handles.push(std::thread::spawn(move || {
            pool.execute(&user(7000, 7000), &CancelToken::new(), "Test", move || {
                let before = counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(1));
                assert_eq!(before + 1, counter.load(Ordering::SeqCst));
                Ok::<(), cephmount_driver::DriverError>(())
            })
        }));
    }
    for h in handles {
        h.join().unwrap().unwrap();
    }
    assert_eq!(serial_counter.load(Ordering::SeqCst), 10);

    // Distinct users can make progress independently of one another.
    let mut handles = Vec::new();
    for uid in 7100..7110 {
        let pool = Arc::clone(&pool);
        handles.push(std::thread::spawn(move || {
            pool.execute(&user(uid, uid), &CancelToken::new(), "Test", || {
                std::thread::sleep(Duration::from_millis(5));
                Ok::<i64, cephmount_driver::DriverError>(uid)
            })
        }));
    }
    for (idx, h) in handles.into_iter().enumerate() {
        assert_eq!(h.join().unwrap().unwrap(), 7100 + idx as i64);
    }

    pool.shutdown();
}

#[test]
fn shutdown_drains_in_flight_work_before_returning() {
    let pool = UserThreadPool::new(Duration::from_secs(60), Duration::from_secs(5), 65534, 65534, probe_stub());
    pool.execute(&user(7200, 7200), &CancelToken::new(), "Test", || Ok::<(), cephmount_driver::DriverError>(())).unwrap();
    pool.shutdown();
    let result = pool.execute(&user(7200, 7200), &CancelToken::new(), "Test", || Ok::<(), cephmount_driver::DriverError>(()));
    assert!(result.is_err());
}
