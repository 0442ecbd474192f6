//! `GetQuota` (spec §4.6): reports usage for the effective root.

use crate::driver::{CephMountDriver, RequestContext};
use crate::error::Result;
use crate::quota::{self, QuotaInfo};

pub fn get_quota(driver: &CephMountDriver, ctx: &RequestContext) -> Result<QuotaInfo> {
    const OP: &str = "GetQuota";
    let jail = driver.jail.clone();
    let config = driver.config.clone();
    driver.pool.execute(&ctx.user, &ctx.cancel, OP, move || {
        let root = jail.absolute_path_for_xattr(".")?;
        quota::get_quota(&root, ".", &config)
    })
}
