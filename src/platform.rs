//! Filesystem helpers that behave differently per platform.
//!
//! - [`absolute_path`] resolves a path without following its last component
//! - [`same_file`] compares device and inode on Unix
//! - [`create_file_link`] creates a symbolic link to a file
//! - [`ensure_link_support`] probes whether links can be created at all

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the probe link created by [`ensure_link_support`].
const PROBE_NAME: &str = ".linkdupe-probe";

/// Make `path` absolute, resolving symlinks in its parent directories only.
///
/// The final component is kept as is, so a path that is itself a symbolic
/// link still names the link and not its target.
///
/// # Errors
///
/// Returns an error with kind [`io::ErrorKind::NotFound`] if the parent
/// directory does not exist.
pub fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => Ok(fs::canonicalize(parent)?.join(name)),
        // Filesystem root, or a path ending in `..`
        _ => fs::canonicalize(&absolute),
    }
}

/// Canonical form of `path` if it exists, otherwise its plain absolute form.
pub fn normalize_dir(path: &Path) -> io::Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(canonical) => Ok(canonical),
        Err(e) if e.kind() == io::ErrorKind::NotFound => std::path::absolute(path),
        Err(e) => Err(e),
    }
}

/// Identity of a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg(unix)]
struct InodeKey {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
impl InodeKey {
    fn of(path: &Path) -> io::Result<Self> {
        use std::os::unix::fs::MetadataExt;
        let metadata = fs::metadata(path)?;
        Ok(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }
}

/// Whether two paths refer to the same file after following links.
///
/// # Errors
///
/// Fails if either path cannot be inspected.
#[cfg(unix)]
pub fn same_file(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(InodeKey::of(a)? == InodeKey::of(b)?)
}

/// Whether two paths refer to the same file after following links.
///
/// # Errors
///
/// Fails if either path cannot be inspected.
#[cfg(not(unix))]
pub fn same_file(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(fs::canonicalize(a)? == fs::canonicalize(b)?)
}

/// Create a symbolic link at `link` pointing to the file `target`.
///
/// # Errors
///
/// Fails if `link` already exists or the platform refuses to create links.
pub fn create_file_link(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(target, link)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = (target, link);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "symbolic links are not supported on this platform",
        ))
    }
}

/// Check that file links can be created inside `dir`.
///
/// A throwaway link is created and removed again. On Windows this fails
/// without the symbolic link privilege.
///
/// # Errors
///
/// Returns the error reported while creating the probe link.
pub fn ensure_link_support(dir: &Path) -> io::Result<()> {
    let probe = dir.join(PROBE_NAME);
    if probe.symlink_metadata().is_ok() {
        fs::remove_file(&probe)?;
    }
    create_file_link(Path::new(PROBE_NAME), &probe)?;
    fs::remove_file(&probe)
}
