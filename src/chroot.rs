//! Chroot jail (spec §4.3): a directory handle that refuses to resolve any
//! path escaping its root, including through a symlink whose target would
//! escape.
//!
//! All paths taken here are chroot-relative (no leading `/`; `"."` denotes
//! the root) — see [`crate::path`] for how external paths are translated
//! into this coordinate. The resolver walks the path component by
//! component, following symlinks itself, in the style of the pack's
//! sandbox rootfs resolvers rather than relying on a from-kernel
//! "resolve beneath" primitive, so it works uniformly across the `nix`
//! versions this crate targets. Any component that would cross above the
//! jail root — a `..` with nothing left to pop, an absolute path
//! component, or a symlink whose target does either — fails the whole
//! resolution with `PermissionDenied` rather than clamping or re-rooting
//! (spec §4.3, §8 invariant 2).

use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

use crate::error::{DriverError, Result};

/// Symlinks nested deeper than this are treated as a loop, mirroring the
/// kernel's own `ELOOP` behavior.
const MAX_SYMLINK_DEPTH: usize = 40;

/// A directory entry yielded by [`ChrootJail::open_dir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Chroot-relative path, e.g. `"foo/bar.txt"`.
    pub chroot_rel: String,
    pub file_name: String,
}

/// A handle to a root directory that all content I/O is resolved against.
///
/// Immutable after construction (spec §5: "process-wide immutable after
/// construction; concurrent use is safe").
#[derive(Debug, Clone)]
pub struct ChrootJail {
    root: PathBuf,
}

impl ChrootJail {
    /// Opens the jail at `root`, which must already exist and be a
    /// directory. Failure here is fatal at startup (spec §7).
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let meta = fs::metadata(&root)
            .map_err(|e| DriverError::from_io("OpenChrootJail", root.display().to_string(), e))?;
        if !meta.is_dir() {
            return Err(DriverError::bad_request(
                "OpenChrootJail",
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(ChrootJail { root })
    }

    /// The jail's root, for diagnostics only; never used to build a
    /// caller-facing path (spec §7: absolute local paths never leak).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `rel` to an absolute local path, following symlinks
    /// component by component and refusing to let the accumulated path
    /// cross above the jail root. `rel` is chroot-relative (no leading
    /// `/`; `"."` means the root).
    ///
    /// When `follow_final` is `false`, the final path component is *not*
    /// dereferenced if it is itself a symlink: the returned path names the
    /// symlink, not its target (needed by `lstat`/`readlink`/`remove`/
    /// `rename`, which must act on the link itself).
    fn resolve(&self, rel: &str, follow_final: bool, op: &'static str) -> Result<PathBuf> {
        let acc = self.root.as_os_str().as_bytes().to_vec();
        let components: Vec<Component> = if rel == "." || rel.is_empty() {
            Vec::new()
        } else {
            Path::new(rel).components().collect()
        };
        let last_index = components.len().saturating_sub(1);
        let mut result = self.resolve_components(&components, acc, 0, follow_final, last_index, op, rel)?;
        if !result.starts_with(&self.root) {
            // Defense in depth: the walk below should never produce this,
            // but a violation here must never reach a syscall.
            return Err(DriverError::containment(op, rel.to_string()));
        }
        if result.as_os_str().is_empty() {
            result = self.root.clone();
        }
        Ok(result)
    }

    /// Walks `components` against `acc`, failing with `PermissionDenied`
    /// the moment a step would cross above the jail root — a `..` with
    /// nothing left to pop, a bare absolute path component, or (via the
    /// recursive call below) a symlink whose target does either. `rel` is
    /// only used to build that error; it never reaches a syscall directly.
    #[allow(clippy::too_many_arguments)]
    fn resolve_components(
        &self,
        components: &[Component],
        mut acc: Vec<u8>,
        depth: usize,
        follow_final: bool,
        last_index: usize,
        op: &'static str,
        rel: &str,
    ) -> Result<PathBuf> {
        let root_len = self.root.as_os_str().as_bytes().len();
        for (idx, component) in components.iter().enumerate() {
            match component {
                Component::Prefix(_) => unreachable!("not possible on POSIX paths"),
                Component::RootDir => {
                    // An absolute path component (either the caller's own
                    // input, which must never start with `/`, or a symlink
                    // target rooted outside the jail) is an escape attempt.
                    return Err(DriverError::containment(op, rel.to_string()));
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if acc.len() <= root_len {
                        return Err(DriverError::containment(op, rel.to_string()));
                    }
                    let last_slash = acc.iter().rposition(|&b| b == b'/').unwrap_or(root_len);
                    acc.truncate(last_slash.max(root_len));
                }
                Component::Normal(part) => {
                    let before = acc.len();
                    acc.push(b'/');
                    acc.extend_from_slice(part.as_bytes());

                    let is_final = idx == last_index;
                    if is_final && !follow_final {
                        continue;
                    }

                    let candidate = PathBuf::from(std::ffi::OsString::from_vec(acc.clone()));
                    if let Ok(target) = fs::read_link(&candidate) {
                        if depth + 1 > MAX_SYMLINK_DEPTH {
                            let loop_err = io::Error::new(io::ErrorKind::FilesystemLoop, "too many symlink levels");
                            return Err(DriverError::from_io(op, rel.to_string(), loop_err));
                        }
                        acc.truncate(before);
                        let target_components: Vec<Component> = target.components().collect();
                        let target_last = target_components.len().saturating_sub(1);
                        let resolved = self.resolve_components(
                            &target_components,
                            acc,
                            depth + 1,
                            // A symlink encountered mid-path must always be
                            // followed to a real directory; only the
                            // outermost final component honors `follow_final`.
                            true,
                            target_last,
                            op,
                            rel,
                        )?;
                        acc = resolved.into_os_string().into_vec();
                    }
                }
            }
        }
        Ok(PathBuf::from(std::ffi::OsString::from_vec(acc)))
    }

    pub fn stat(&self, rel: &str) -> Result<Metadata> {
        let path = self.resolve(rel, true, "Stat")?;
        fs::metadata(&path).map_err(|e| DriverError::from_io("Stat", rel.to_string(), e))
    }

    pub fn lstat(&self, rel: &str) -> Result<Metadata> {
        let path = self.resolve(rel, false, "Lstat")?;
        fs::symlink_metadata(&path).map_err(|e| DriverError::from_io("Lstat", rel.to_string(), e))
    }

    pub fn readlink(&self, rel: &str) -> Result<String> {
        let path = self.resolve(rel, false, "Readlink")?;
        let target = fs::read_link(&path).map_err(|e| DriverError::from_io("Readlink", rel.to_string(), e))?;
        Ok(target.to_string_lossy().into_owned())
    }

    pub fn open(&self, rel: &str, options: &OpenOptions) -> Result<File> {
        let path = self.resolve(rel, true, "Open")?;
        options.open(&path).map_err(|e| DriverError::from_io("Open", rel.to_string(), e))
    }

    pub fn create(&self, rel: &str, mode: u32) -> Result<File> {
        let path = self.resolve(rel, true, "Create")?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| DriverError::from_io("Create", rel.to_string(), e))?;
        set_mode(&file, mode).map_err(|e| DriverError::from_io("Create", rel.to_string(), e))?;
        Ok(file)
    }

    /// `mkdir -p` semantics: not an error if the directory already exists
    /// (spec §4.6 `CreateDir`).
    pub fn mkdir_all(&self, rel: &str, mode: u32) -> Result<()> {
        let components: Vec<&str> = rel.split('/').filter(|c| !c.is_empty() && *c != ".").collect();
        let mut built = String::from(".");
        for component in components {
            if built == "." {
                built = component.to_string();
            } else {
                built = format!("{built}/{component}");
            }
            let path = self.resolve(&built, true, "CreateDir")?;
            match fs::create_dir(&path) {
                Ok(()) => {
                    if let Ok(dir) = File::open(&path) {
                        let _ = set_mode(&dir, mode);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(DriverError::from_io("CreateDir", rel.to_string(), e)),
            }
        }
        Ok(())
    }

    pub fn remove(&self, rel: &str) -> Result<()> {
        let path = self.resolve(rel, false, "Delete")?;
        let meta = fs::symlink_metadata(&path).map_err(|e| DriverError::from_io("Delete", rel.to_string(), e))?;
        if meta.is_dir() {
            fs::remove_dir(&path)
        } else {
            fs::remove_file(&path)
        }
        .map_err(|e| DriverError::from_io("Delete", rel.to_string(), e))
    }

    pub fn remove_all(&self, rel: &str) -> Result<()> {
        let path = self.resolve(rel, false, "Delete")?;
        fs::remove_dir_all(&path).map_err(|e| DriverError::from_io("Delete", rel.to_string(), e))
    }

    pub fn rename(&self, old_rel: &str, new_rel: &str) -> Result<()> {
        let old_path = self.resolve(old_rel, false, "Move")?;
        let new_path = self.resolve(new_rel, false, "Move")?;
        fs::rename(&old_path, &new_path).map_err(|e| DriverError::from_io("Move", new_rel.to_string(), e))
    }

    pub fn open_dir(&self, rel: &str) -> Result<Vec<DirEntry>> {
        let path = self.resolve(rel, true, "ListFolder")?;
        let read_dir = fs::read_dir(&path).map_err(|e| DriverError::from_io("ListFolder", rel.to_string(), e))?;
        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| DriverError::from_io("ListFolder", rel.to_string(), e))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let chroot_rel = if rel == "." { file_name.clone() } else { format!("{rel}/{file_name}") };
            entries.push(DirEntry { chroot_rel, file_name });
        }
        Ok(entries)
    }

    /// Used by `GetQuota` and xattr operations to build the absolute path
    /// to an already-resolved, already-contained chroot-relative path. This
    /// does not itself perform any containment check — callers must have
    /// already resolved through one of this jail's other methods, or
    /// through [`crate::path::PathTranslator::check_containment`].
    pub fn absolute_path_for_xattr(&self, rel: &str) -> Result<PathBuf> {
        self.resolve(rel, true, "Xattr")
    }
}

fn set_mode(file: &File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(mode);
    file.set_permissions(perms)
}
