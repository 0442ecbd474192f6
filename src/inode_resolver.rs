//! MDS-based inode resolution (spec §4.8), feature-gated behind
//! `mds-inode-resolve` since it requires shelling out to `ceph` and talking
//! to a live MDS cluster.
//!
//! Resolves an opaque resource id carrying a raw inode number back to a
//! path by asking the active rank-0 MDS daemon for a `dump inode`. The
//! result is run back through [`PathTranslator::rados_to_user`] and its
//! containment check a second time (defense in depth: an MDS response is
//! external input, no different from a client-supplied path).

use std::process::Command;

use log::debug;
use regex::Regex;
use serde_json::Value;

use crate::error::{DriverError, Result};
use crate::path::PathTranslator;

const OP: &str = "ResolveInode";

/// Parses an opaque resource id of the form `<fs-name>:<inode>` or a bare
/// decimal inode number into its numeric inode (spec §4.8 step 1).
pub fn parse_inode_opaque_id(opaque_id: &str) -> Result<i64> {
    let numeric = opaque_id.rsplit(':').next().unwrap_or(opaque_id);
    numeric
        .parse::<i64>()
        .map_err(|_| DriverError::bad_request(OP, format!("opaque id is not an inode reference: {opaque_id:?}")))
}

fn run_ceph_command(args: &[&str]) -> Result<Value> {
    let output = Command::new("ceph")
        .args(args)
        .output()
        .map_err(|e| DriverError::from_io(OP, "ceph", e))?;
    if !output.status.success() {
        return Err(DriverError::bad_request(
            OP,
            format!("ceph {args:?} failed: {}", String::from_utf8_lossy(&output.stderr)),
        ));
    }
    serde_json::from_slice(&output.stdout)
        .map_err(|e| DriverError::bad_request(OP, format!("ceph {args:?} produced invalid JSON: {e}")))
}

/// Locates the active rank-0 MDS daemon name from a `fs dump` response
/// (spec §4.8 step 2). Accepts either `{"filesystems": [...]}` or a bare
/// array, since the JSON shape has drifted across Ceph releases.
fn find_active_rank0_daemon(fs_dump: &Value) -> Result<String> {
    let filesystems = fs_dump
        .get("filesystems")
        .and_then(Value::as_array)
        .or_else(|| fs_dump.as_array())
        .ok_or_else(|| DriverError::bad_request(OP, "fs dump had no filesystems array"))?;

    for filesystem in filesystems {
        let mdsmap = filesystem.get("mdsmap").unwrap_or(filesystem);
        let Some(up) = mdsmap.get("up").and_then(|v| v.get("mds_0")) else { continue };
        let gid = up.as_i64().or_else(|| up.as_str().and_then(|s| s.parse().ok()));
        let Some(gid) = gid else { continue };

        let Some(info) = mdsmap.get("info").and_then(Value::as_object) else { continue };
        for entry in info.values() {
            let entry_gid = entry.get("gid").and_then(Value::as_i64);
            if entry_gid != Some(gid) {
                continue;
            }
            let state = entry.get("state").and_then(Value::as_str).unwrap_or("");
            if !state.contains("active") {
                continue;
            }
            if let Some(name) = entry.get("name").and_then(Value::as_str) {
                return Ok(name.to_string());
            }
        }
    }
    Err(DriverError::bad_request(OP, "no active rank-0 MDS daemon found in fs dump"))
}

/// Extracts a path from a `dump inode` response, trying the JSON field
/// names that have appeared across Ceph releases before falling back to a
/// regex scrape of the raw text (spec §4.8 step 4).
fn extract_path_from_dump_inode(value: &Value, raw: &str) -> Result<String> {
    for field in ["path", "full_path", "pathname"] {
        if let Some(path) = value.get(field).and_then(Value::as_str) {
            return Ok(path.to_string());
        }
    }
    if let (Some(dname), Some(name)) = (
        value.get("dname").and_then(Value::as_str),
        value.get("name").and_then(Value::as_str),
    ) {
        let _ = name;
        return Ok(dname.to_string());
    }

    let fallback = Regex::new(r#"path["\s:=]+"?(/[^"\s,}]*)"#)
        .expect("static regex is valid");
    if let Some(captures) = fallback.captures(raw) {
        if let Some(path) = captures.get(1) {
            return Ok(path.as_str().to_string());
        }
    }

    Err(DriverError::bad_request(OP, "dump inode response did not contain a recognizable path"))
}

/// Resolves `opaque_id` (spec §4.8) to an external path, validating
/// containment twice: once via [`PathTranslator::rados_to_user`]'s own
/// prefix check, and once more explicitly via
/// [`PathTranslator::check_containment`] after converting to chroot-relative
/// form.
pub fn resolve_inode_to_path(translator: &PathTranslator, opaque_id: &str) -> Result<String> {
    let inode = parse_inode_opaque_id(opaque_id)?;

    let fs_dump = run_ceph_command(&["fs", "dump", "--format=json"])?;
    let daemon = find_active_rank0_daemon(&fs_dump)?;
    debug!("resolving inode {inode} via active rank-0 MDS daemon {daemon}");

    let output = Command::new("ceph")
        .args(["tell", &format!("mds.{daemon}"), "dump", "inode", &inode.to_string()])
        .output()
        .map_err(|e| DriverError::from_io(OP, "ceph", e))?;
    if !output.status.success() {
        return Err(DriverError::bad_request(
            OP,
            format!("dump inode failed: {}", String::from_utf8_lossy(&output.stderr)),
        ));
    }

    let raw = String::from_utf8_lossy(&output.stdout).into_owned();
    let rados_path = match serde_json::from_str::<Value>(&raw) {
        Ok(value) => extract_path_from_dump_inode(&value, &raw)?,
        Err(_) => extract_path_from_dump_inode(&Value::Null, &raw)?,
    };

    let external = translator.rados_to_user(&rados_path)?;
    let chroot_rel = translator.to_chroot(&external)?;
    translator.check_containment(&chroot_rel, OP)?;
    Ok(external)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_decimal_opaque_id() {
        assert_eq!(parse_inode_opaque_id("1099511627776").unwrap(), 1099511627776);
    }

    #[test]
    fn parses_fs_name_prefixed_opaque_id() {
        assert_eq!(parse_inode_opaque_id("cephfs:1099511627776").unwrap(), 1099511627776);
    }

    #[test]
    fn rejects_non_numeric_opaque_id() {
        assert!(parse_inode_opaque_id("not-an-inode").is_err());
    }

    #[test]
    fn extracts_path_field_when_present() {
        let value = serde_json::json!({ "path": "/projects/a.txt" });
        assert_eq!(extract_path_from_dump_inode(&value, "").unwrap(), "/projects/a.txt");
    }

    #[test]
    fn falls_back_to_regex_scrape_on_non_json_output() {
        let raw = r#"inode dump: path: "/projects/b.txt", size: 10"#;
        let path = extract_path_from_dump_inode(&Value::Null, raw).unwrap();
        assert_eq!(path, "/projects/b.txt");
    }

    #[test]
    fn finds_active_rank0_daemon_from_typical_fs_dump() {
        let dump = serde_json::json!({
            "filesystems": [{
                "mdsmap": {
                    "up": { "mds_0": 4107 },
                    "info": {
                        "gid_4107": { "gid": 4107, "name": "cephfs.host-a.abcde", "state": "up:active" }
                    }
                }
            }]
        });
        assert_eq!(find_active_rank0_daemon(&dump).unwrap(), "cephfs.host-a.abcde");
    }
}
