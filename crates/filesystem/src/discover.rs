//! Expansion of command-line inputs into the list of archives to upload.
//!
//! An input is one of:
//! - an archive directory (`takeout-001/`)
//! - a directory of archives, recognized by children named `takeout*`
//! - a glob pattern (`/data/takeout-*`) when glob expansion is requested
//!
//! `.zip` archives are read in place by [`ZipSource`](crate::ZipSource).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use media_relay_common::archive_name;
use walkdir::WalkDir;

use crate::error::SourceError;

const ARCHIVE_NAME_PREFIX: &str = "takeout";

/// How an archive is stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Directory,
    Zip,
}

/// One archive found while expanding the inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInput {
    /// Archive name; also names its journal.
    pub name: String,
    pub path: PathBuf,
    pub kind: ArchiveKind,
}

impl ArchiveInput {
    fn from_path(path: PathBuf) -> Option<Self> {
        let kind: ArchiveKind = if path.is_dir() {
            ArchiveKind::Directory
        } else if is_zip(&path) {
            ArchiveKind::Zip
        } else {
            return None;
        };

        Some(Self {
            name: archive_name(&path),
            path,
            kind,
        })
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

fn looks_like_archive(path: &Path) -> bool {
    let name: String = archive_name(path).to_ascii_lowercase();
    name.starts_with(ARCHIVE_NAME_PREFIX) && (path.is_dir() || is_zip(path))
}

/// Expand inputs into archives, in input order with duplicates removed.
///
/// Archive names are unique (case-insensitively) since they name journals. An
/// archive whose name is taken is renamed `<parent>-<name>`, then `<name>-2`,
/// `<name>-3`, and so on.
///
/// # Arguments
/// * `inputs` - Paths, or glob patterns when `use_glob` is set
/// * `use_glob` - Treat each input as a glob pattern
///
/// # Errors
/// Returns error if a plain input does not exist, is neither a directory nor a
/// zip file, or a pattern is invalid. A pattern matching nothing is only logged.
pub fn discover_archives(inputs: &[String], use_glob: bool) -> Result<Vec<ArchiveInput>, SourceError> {
    let mut archives: Vec<ArchiveInput> = Vec::new();
    let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
    let mut names: BTreeSet<String> = BTreeSet::new();

    for input in inputs {
        let found: Vec<ArchiveInput> = if use_glob {
            expand_pattern(input)?
        } else {
            expand_path(Path::new(input))?
        };

        if found.is_empty() {
            tracing::warn!(input = %input, "No archives found");
            continue;
        }
        tracing::info!(input = %input, archives = found.len(), "Found archives");

        for mut archive in found {
            if !seen.insert(archive.path.clone()) {
                continue;
            }
            let unique: String = unique_name(&archive, &names);
            if unique != archive.name {
                tracing::warn!(
                    path = %archive.path.display(),
                    name = %archive.name,
                    renamed = %unique,
                    "Archive name already in use"
                );
                archive.name = unique;
            }
            names.insert(archive.name.to_lowercase());
            archives.push(archive);
        }
    }

    Ok(archives)
}

fn unique_name(archive: &ArchiveInput, taken: &BTreeSet<String>) -> String {
    let is_free = |name: &str| !taken.contains(&name.to_lowercase());
    if is_free(&archive.name) {
        return archive.name.clone();
    }

    if let Some(parent) = archive.path.parent() {
        let parent_name: String = archive_name(parent);
        if !parent_name.is_empty() {
            let qualified: String = format!("{}-{}", parent_name, archive.name);
            if is_free(&qualified) {
                return qualified;
            }
        }
    }

    let mut counter: usize = 2;
    loop {
        let numbered: String = format!("{}-{}", archive.name, counter);
        if is_free(&numbered) {
            return numbered;
        }
        counter += 1;
    }
}

fn expand_path(path: &Path) -> Result<Vec<ArchiveInput>, SourceError> {
    if !path.exists() {
        return Err(SourceError::InputNotFound {
            path: path.display().to_string(),
        });
    }

    if !path.is_dir() {
        return match ArchiveInput::from_path(path.to_path_buf()) {
            Some(archive) => Ok(vec![archive]),
            None => Err(SourceError::UnsupportedArchive {
                path: path.display().to_string(),
                reason: "expected a directory or a .zip file".into(),
            }),
        };
    }

    let entries: std::fs::ReadDir =
        std::fs::read_dir(path).map_err(|e| SourceError::io(path.display().to_string(), e))?;
    let mut children: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry: std::fs::DirEntry =
            entry.map_err(|e| SourceError::io(path.display().to_string(), e))?;
        let child: PathBuf = entry.path();
        if looks_like_archive(&child) {
            children.push(child);
        }
    }

    if children.is_empty() {
        return Ok(ArchiveInput::from_path(path.to_path_buf()).into_iter().collect());
    }

    children.sort();
    Ok(children
        .into_iter()
        .filter_map(ArchiveInput::from_path)
        .collect())
}

fn has_glob_meta(component: &std::path::Component) -> bool {
    component
        .as_os_str()
        .to_string_lossy()
        .contains(['*', '?', '[', '{'])
}

/// Number of leading pattern components without glob metacharacters.
fn literal_prefix_len(pattern: &str) -> usize {
    Path::new(pattern)
        .components()
        .take_while(|c| !has_glob_meta(c))
        .count()
}

/// Literal directory prefix of a pattern, where the walk starts.
fn pattern_base(pattern: &str) -> PathBuf {
    let base: PathBuf = Path::new(pattern)
        .components()
        .take(literal_prefix_len(pattern))
        .collect();
    if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base
    }
}

fn expand_pattern(pattern: &str) -> Result<Vec<ArchiveInput>, SourceError> {
    let base: PathBuf = pattern_base(pattern);
    if base == Path::new(pattern) {
        // No metacharacters: behave like a plain path, but tolerate absence.
        return if base.exists() {
            expand_path(&base)
        } else {
            Ok(Vec::new())
        };
    }

    let glob: GlobMatcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| SourceError::InvalidGlobPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?
        .compile_matcher();
    let max_depth: usize = if pattern.contains("**") {
        usize::MAX
    } else {
        Path::new(pattern).components().count() - literal_prefix_len(pattern)
    };
    let strip_dot: bool = !pattern.starts_with("./") && base == Path::new(".");

    let mut matches: Vec<PathBuf> = Vec::new();
    let walker: WalkDir = WalkDir::new(&base).min_depth(1).max_depth(max_depth);
    for entry in walker.into_iter().filter_map(Result::ok) {
        let candidate: &Path = match strip_dot {
            true => entry.path().strip_prefix(".").unwrap_or(entry.path()),
            false => entry.path(),
        };
        if glob.is_match(candidate) {
            matches.push(entry.path().to_path_buf());
        }
    }

    matches.sort();
    Ok(matches
        .into_iter()
        .filter_map(ArchiveInput::from_path)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mkdir(root: &Path, name: &str) -> PathBuf {
        let path: PathBuf = root.join(name);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    #[test]
    fn test_single_archive_directory() {
        let dir: TempDir = TempDir::new().unwrap();
        let archive: PathBuf = mkdir(dir.path(), "my-photos");
        std::fs::write(archive.join("a.jpg"), b"x").unwrap();

        let found: Vec<ArchiveInput> =
            discover_archives(&[archive.display().to_string()], false).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "my-photos");
        assert_eq!(found[0].kind, ArchiveKind::Directory);
    }

    #[test]
    fn test_directory_of_archives() {
        let dir: TempDir = TempDir::new().unwrap();
        mkdir(dir.path(), "takeout-002");
        mkdir(dir.path(), "takeout-001");
        mkdir(dir.path(), "unrelated");
        std::fs::write(dir.path().join("takeout-003.zip"), b"PK").unwrap();

        let found: Vec<ArchiveInput> =
            discover_archives(&[dir.path().display().to_string()], false).unwrap();
        let names: Vec<&str> = found.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["takeout-001", "takeout-002", "takeout-003.zip"]);
        assert_eq!(found[2].kind, ArchiveKind::Zip);
    }

    #[test]
    fn test_missing_input() {
        let dir: TempDir = TempDir::new().unwrap();
        let result = discover_archives(&[dir.path().join("gone").display().to_string()], false);
        assert!(matches!(result, Err(SourceError::InputNotFound { .. })));
    }

    #[test]
    fn test_glob_pattern() {
        let dir: TempDir = TempDir::new().unwrap();
        mkdir(dir.path(), "takeout-001");
        mkdir(dir.path(), "takeout-002");
        mkdir(dir.path(), "other-001");

        let pattern: String = format!("{}/takeout-*", dir.path().display());
        let found: Vec<ArchiveInput> = discover_archives(&[pattern], true).unwrap();
        let names: Vec<&str> = found.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["takeout-001", "takeout-002"]);
    }

    #[test]
    fn test_glob_without_matches_is_empty() {
        let dir: TempDir = TempDir::new().unwrap();
        let pattern: String = format!("{}/nothing-*", dir.path().display());
        assert!(discover_archives(&[pattern], true).unwrap().is_empty());
    }

    #[test]
    fn test_duplicates_removed() {
        let dir: TempDir = TempDir::new().unwrap();
        let archive: PathBuf = mkdir(dir.path(), "takeout-001");
        let input: String = archive.display().to_string();

        let found: Vec<ArchiveInput> = discover_archives(&[input.clone(), input], false).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_same_named_archives_get_unique_names() {
        let dir: TempDir = TempDir::new().unwrap();
        let one: PathBuf = mkdir(&dir.path().join("one"), "Takeout");
        let two: PathBuf = mkdir(&dir.path().join("two"), "Takeout");
        let three: PathBuf = mkdir(&dir.path().join("x/two"), "takeout");

        let inputs: Vec<String> = [&one, &two, &three]
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let found: Vec<ArchiveInput> = discover_archives(&inputs, false).unwrap();
        let names: Vec<&str> = found.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Takeout", "two-Takeout", "takeout-2"]);
    }

    #[test]
    fn test_pattern_base() {
        assert_eq!(pattern_base("/data/takeout-*"), PathBuf::from("/data"));
        assert_eq!(pattern_base("takeout-*/x"), PathBuf::from("."));
        assert_eq!(pattern_base("a/b/{c,d}"), PathBuf::from("a/b"));
        assert_eq!(literal_prefix_len("takeout-*"), 0);
    }
}
