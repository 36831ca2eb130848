//! Path utilities for archive-relative keys and journal layout.

use std::path::{Component, Path, PathBuf};

use crate::constants::DEFAULT_JOURNAL_FILE_NAME;
use crate::error::PathError;

/// Lexical path normalization without filesystem access.
///
/// Removes `.` components and resolves `..` components lexically.
/// Does not access the filesystem or resolve symlinks.
///
/// # Arguments
/// * `path` - Path to normalize
///
/// # Returns
/// Normalized path with `.` and `..` resolved lexically.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !components.is_empty()
                    && !matches!(
                        components.last(),
                        Some(Component::ParentDir) | Some(Component::RootDir)
                    )
                {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

/// Convert a path to a POSIX-style string (forward slashes).
///
/// # Arguments
/// * `path` - Path to convert
///
/// # Returns
/// String with forward slashes as separators.
pub fn to_posix_path(path: &Path) -> String {
    path.components()
        .filter(|c: &Component| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .map(|c: Component| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Express `path` relative to an archive `root` as a POSIX string.
///
/// This is the key a file is journaled and uploaded under.
///
/// # Arguments
/// * `path` - File path found while walking the archive
/// * `root` - Archive root directory
///
/// # Errors
/// Returns error if the path is outside the root or not valid UTF-8.
pub fn relative_posix_path(path: &Path, root: &Path) -> Result<String, PathError> {
    let normalized: PathBuf = lexical_normalize(path);
    let normalized_root: PathBuf = lexical_normalize(root);

    let relative: &Path =
        normalized
            .strip_prefix(&normalized_root)
            .map_err(|_| PathError::PathOutsideRoot {
                path: normalized.display().to_string(),
                root: normalized_root.display().to_string(),
            })?;

    if relative.to_str().is_none() {
        return Err(PathError::NonUtf8 {
            path: relative.to_string_lossy().into_owned(),
        });
    }

    Ok(to_posix_path(relative))
}

/// Build the remote object key for an archive-relative path.
///
/// # Arguments
/// * `prefix` - Optional key prefix (leading and trailing slashes are ignored)
/// * `path` - Archive-relative POSIX path
///
/// # Returns
/// `"{prefix}/{path}"`, or just `path` when the prefix is empty.
pub fn object_key(prefix: &str, path: &str) -> String {
    let prefix: &str = prefix.trim_matches('/');
    let path: &str = path.trim_start_matches('/');
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", prefix, path)
    }
}

/// Name an archive after the last component of its path.
///
/// # Arguments
/// * `path` - Archive directory or file
///
/// # Returns
/// The file name, or the full lossy path when there is none (e.g. `/`).
pub fn archive_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.to_string_lossy().into_owned(),
    }
}

/// Journal file for one archive under a configured journal path.
///
/// A path ending in `.json` is a file template: `journals/run.json` becomes
/// `journals/run-{archive}.json`. Any other path is a directory holding one
/// `{archive}.json` per archive.
///
/// # Arguments
/// * `base` - Configured journal path
/// * `archive` - Archive name
pub fn archive_journal_path(base: &Path, archive: &str) -> PathBuf {
    let is_template: bool = base
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if !is_template {
        return base.join(format!("{}.json", archive));
    }

    let stem: String = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.with_file_name(format!("{}-{}.json", stem, archive))
}

/// Shared journal location used when no journal path is configured.
///
/// # Errors
/// Returns error if the home directory cannot be determined.
pub fn default_journal_path() -> Result<PathBuf, PathError> {
    dirs::home_dir()
        .map(|home: PathBuf| home.join(DEFAULT_JOURNAL_FILE_NAME))
        .ok_or(PathError::NoHomeDirectory)
}
