//! Path-containment end-to-end scenarios (spec §8 invariants 2 and 7).

use std::fs;
use std::os::unix::fs::symlink;

use cephmount_driver::config::DriverConfig;
use cephmount_driver::{CephMountDriver, RequestContext, ResourceReference, UserIdentity};

fn test_driver(root: &std::path::Path) -> CephMountDriver {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = DriverConfig::default();
    config.testing_allow_local_mode = true;
    std::env::set_var(cephmount_driver::config::TEST_CHROOT_DIR_ENV, root);
    CephMountDriver::new(config).unwrap()
}

fn ctx() -> RequestContext {
    RequestContext::new(UserIdentity {
        opaque_id: "x".into(),
        idp: "idp".into(),
        username: "alice".into(),
        uid: 6001,
        gid: 6001,
        groups: vec![],
    })
}

#[test]
fn dotdot_traversal_is_rejected_without_any_syscall() {
    let dir = tempfile::tempdir().unwrap();
    let driver = test_driver(dir.path());
    let reference = ResourceReference::path("/../../etc/passwd").unwrap();
    let result = cephmount_driver::ops::dir::get_md(&driver, &ctx(), &reference);
    assert!(result.is_err());
    driver.shutdown();
}

#[test]
fn symlink_escape_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    fs::write(outside.path().join("secret"), b"top secret").unwrap();
    symlink(outside.path().join("secret"), dir.path().join("escape")).unwrap();

    let driver = test_driver(dir.path());
    let reference = ResourceReference::path("/escape").unwrap();
    let result = cephmount_driver::ops::dir::get_md(&driver, &ctx(), &reference);
    assert!(matches!(result, Err(cephmount_driver::DriverError::PermissionDenied { .. })));
    driver.shutdown();
}

#[test]
fn single_user_stat_reports_expected_fields() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("foo.txt"), b"hello world").unwrap();
    let driver = test_driver(dir.path());
    let reference = ResourceReference::path("/foo.txt").unwrap();
    let info = cephmount_driver::ops::dir::get_md(&driver, &ctx(), &reference).unwrap();
    assert_eq!(info.size, 11);
    assert_eq!(info.external_path, "/foo.txt");
    driver.shutdown();
}
