//! Reads scripts and key material from the local filesystem.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

/// Expands a leading `~/` prefix to the user's home directory.
///
/// When `HOME` is unset the path is returned unchanged.
///
/// # Examples
///
/// ```
/// # use flotilla::local_file::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.ssh/id_rsa"), format!("{home}/.ssh/id_rsa"));
/// assert_eq!(expand_tilde("/etc/hosts"), "/etc/hosts");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Resolves `path` against the working directory, following `..`
/// components and symbolic links.
///
/// # Errors
///
/// Returns a human readable message when the path does not exist or its
/// resolved form is not valid UTF-8.
pub fn resolve(path: &Utf8Path) -> Result<Utf8PathBuf, String> {
    let canonical = std::fs::canonicalize(path).map_err(|err| format!("{path}: {err}"))?;
    Utf8PathBuf::try_from(canonical)
        .map_err(|err| format!("{path} resolves to a non UTF-8 path: {}", err.as_path().display()))
}

/// Reads a UTF-8 file through a capability-scoped handle on the directory
/// that actually holds it.
///
/// # Errors
///
/// Returns a human readable message when the path cannot be resolved, the
/// parent directory cannot be opened or the file cannot be read.
pub fn read_to_string(path: &Utf8Path) -> Result<String, String> {
    let resolved = resolve(path)?;
    let parent = resolved
        .parent()
        .ok_or_else(|| format!("path has no parent directory: {resolved}"))?;
    let file_name = resolved
        .file_name()
        .ok_or_else(|| format!("path has no file name: {resolved}"))?;

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_name).map_err(|err| err.to_string())
}
