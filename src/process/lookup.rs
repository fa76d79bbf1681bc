/*!
 * Executable Lookup
 * Resolves command names against the search path
 */

use std::ffi::OsStr;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Resolve `name` to an executable path
///
/// Names containing a `/` are checked as-is; others are searched in each
/// `PATH` entry (an empty entry means the current directory). "Not found"
/// is `Ok(None)`; only unexpected filesystem errors surface as `Err`.
pub fn resolve_executable(name: &str, search_path: Option<&OsStr>) -> io::Result<Option<PathBuf>> {
    if name.is_empty() {
        return Ok(None);
    }

    if name.contains('/') {
        let candidate = PathBuf::from(name);
        return Ok(is_executable(&candidate)?.then_some(candidate));
    }

    let Some(search_path) = search_path else {
        return Ok(None);
    };

    for dir in std::env::split_paths(search_path) {
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        };
        let candidate = dir.join(name);
        if is_executable(&candidate)? {
            trace!(name, path = %candidate.display(), "Resolved executable");
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

/// Whether `name` is reachable through the process's `PATH`
///
/// Never escalates: unexpected errors are logged and reported as `false`.
pub fn path_exists(name: &str) -> bool {
    let search_path = std::env::var_os("PATH");
    match resolve_executable(name, search_path.as_deref()) {
        Ok(found) => found.is_some(),
        Err(e) => {
            warn!(name, error = %e, "Executable lookup failed");
            false
        }
    }
}

fn is_executable(path: &Path) -> io::Result<bool> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.is_file() && meta.permissions().mode() & 0o111 != 0),
        Err(e) if is_absent(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_absent(err: &io::Error) -> bool {
    // ENOTDIR shows up when a PATH entry is a regular file
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    ) || err.raw_os_error() == Some(nix::libc::ENOTDIR)
}
