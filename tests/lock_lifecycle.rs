//! Lock round-trip scenario (spec §8 scenario 5).

use cephmount_driver::config::DriverConfig;
use cephmount_driver::locks::{AdvisoryLockRecord, LockHolder, LockType};
use cephmount_driver::{CephMountDriver, RequestContext, ResourceReference, UserIdentity};

fn test_driver(root: &std::path::Path) -> CephMountDriver {
    let mut config = DriverConfig::default();
    config.testing_allow_local_mode = true;
    std::env::set_var(cephmount_driver::config::TEST_CHROOT_DIR_ENV, root);
    CephMountDriver::new(config).unwrap()
}

fn ctx() -> RequestContext {
    RequestContext::new(UserIdentity {
        opaque_id: "x".into(),
        idp: "idp".into(),
        username: "dave".into(),
        uid: 6002,
        gid: 6002,
        groups: vec![],
    })
}

#[test]
fn set_get_unlock_round_trips_then_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("locked.txt"), b"x").unwrap();
    let driver = test_driver(dir.path());
    let reference = ResourceReference::path("/locked.txt").unwrap();

    let record = AdvisoryLockRecord {
        lock_id: "x".to_string(),
        lock_type: LockType::Exclusive,
        holder: LockHolder { user: None, app_name: Some("app-a".to_string()) },
        expiration_seconds: i64::MAX / 2,
    };

    cephmount_driver::ops::locks::set_lock(&driver, &ctx(), &reference, record.clone()).unwrap();
    let fetched = cephmount_driver::ops::locks::get_lock(&driver, &ctx(), &reference).unwrap();
    assert_eq!(fetched.lock_id, "x");
    assert_eq!(fetched.holder, record.holder);

    cephmount_driver::ops::locks::unlock(&driver, &ctx(), &reference, record).unwrap();
    assert!(cephmount_driver::ops::locks::get_lock(&driver, &ctx(), &reference).is_err());

    driver.shutdown();
}

#[test]
fn competing_set_lock_is_rejected_while_the_first_grant_is_held() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("contended.txt"), b"x").unwrap();
    let driver = test_driver(dir.path());
    let reference = ResourceReference::path("/contended.txt").unwrap();

    let first = AdvisoryLockRecord {
        lock_id: "first".to_string(),
        lock_type: LockType::Exclusive,
        holder: LockHolder { user: None, app_name: Some("app-a".to_string()) },
        expiration_seconds: i64::MAX / 2,
    };
    let second = AdvisoryLockRecord {
        lock_id: "second".to_string(),
        lock_type: LockType::Exclusive,
        holder: LockHolder { user: None, app_name: Some("app-b".to_string()) },
        expiration_seconds: i64::MAX / 2,
    };

    cephmount_driver::ops::locks::set_lock(&driver, &ctx(), &reference, first).unwrap();

    // The kernel flock acquired by the first SetLock is still held by this
    // driver, via an independently-opened fd, so a second SetLock must fail
    // rather than silently clobbering the first grant.
    let file = std::fs::OpenOptions::new().read(true).write(true).open(dir.path().join("contended.txt")).unwrap();
    use std::os::fd::AsFd;
    let result = nix::fcntl::flock(file.as_fd(), nix::fcntl::FlockArg::LockExclusiveNonblock);
    assert!(result.is_err());

    let second_attempt = cephmount_driver::ops::locks::set_lock(&driver, &ctx(), &reference, second);
    assert!(second_attempt.is_err());

    driver.shutdown();
}
