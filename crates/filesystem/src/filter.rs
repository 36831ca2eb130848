//! Selection of uploadable files inside an archive.
//!
//! A [`MediaFilter`] combines three rules:
//! - side-car metadata files (`IMG_0001.jpg.json`) are never uploaded on their own
//! - by default only image and video files are selected
//! - optional include/exclude glob patterns, matched against the archive-relative
//!   POSIX path (`**`, `*.{png,jpg}` and `[abc]` are supported)
//! - optional skipped directories, given as literal names and matched at any depth

use globset::{Glob, GlobSet, GlobSetBuilder};
use media_relay_storage::content_type::is_media_file;

use crate::error::SourceError;
use crate::sidecar::is_sidecar_path;

/// Escape glob metacharacters so `s` matches literally.
///
/// # Example
/// ```
/// use media_relay_filesystem::filter::escape_glob;
///
/// assert_eq!(escape_glob("Album [2019]"), r"Album \[2019\]");
/// ```
pub fn escape_glob(s: &str) -> String {
    let mut escaped: String = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '{' | '}' | '!') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Compile patterns into a set; `None` for an empty list.
pub(crate) fn compile_globs(patterns: &[String]) -> Result<Option<GlobSet>, SourceError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder: GlobSetBuilder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob: Glob = Glob::new(pattern).map_err(|e| SourceError::InvalidGlobPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }

    let set: GlobSet = builder
        .build()
        .map_err(|e| SourceError::InvalidGlobPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;
    Ok(Some(set))
}

/// Decides which files of an archive are uploaded.
#[derive(Debug, Clone)]
pub struct MediaFilter {
    /// Select only image and video files.
    media_only: bool,
    include: Vec<String>,
    exclude: Vec<String>,
    include_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
}

impl Default for MediaFilter {
    fn default() -> Self {
        Self {
            media_only: true,
            include: Vec::new(),
            exclude: Vec::new(),
            include_set: None,
            exclude_set: None,
        }
    }
}

impl MediaFilter {
    /// Media files only, no patterns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every file except side-cars.
    pub fn all_files() -> Self {
        Self {
            media_only: false,
            ..Self::default()
        }
    }

    /// Add include and exclude patterns.
    ///
    /// # Arguments
    /// * `include` - Patterns a path must match one of (empty = everything)
    /// * `exclude` - Patterns a path must match none of
    ///
    /// # Errors
    /// Returns error if any pattern is invalid.
    pub fn with_patterns(
        mut self,
        include: Vec<String>,
        exclude: Vec<String>,
    ) -> Result<Self, SourceError> {
        self.include_set = compile_globs(&include)?;
        self.exclude_set = compile_globs(&exclude)?;
        self.include = include;
        self.exclude = exclude;
        Ok(self)
    }

    /// Skip every file below a directory with one of these names, at any depth.
    ///
    /// Names are literal: `Album [2019]` skips exactly that directory.
    ///
    /// # Errors
    /// Returns error if the resulting exclude set cannot be compiled.
    pub fn with_skipped_dirs(self, dirs: &[String]) -> Result<Self, SourceError> {
        let include: Vec<String> = self.include.clone();
        let mut exclude: Vec<String> = self.exclude.clone();
        exclude.extend(dirs.iter().map(|dir| format!("**/{}/**", escape_glob(dir))));
        self.with_patterns(include, exclude)
    }

    pub fn media_only(&self) -> bool {
        self.media_only
    }

    pub fn include_patterns(&self) -> &[String] {
        &self.include
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude
    }

    /// Check whether an archive-relative path should be uploaded.
    ///
    /// # Arguments
    /// * `path` - POSIX-style path relative to the archive root
    pub fn matches(&self, path: &str) -> bool {
        if is_sidecar_path(path) {
            return false;
        }

        if self.media_only && !is_media_file(path) {
            return false;
        }

        let included: bool = match &self.include_set {
            Some(set) => set.is_match(path),
            None => true,
        };

        let excluded: bool = match &self.exclude_set {
            Some(set) => set.is_match(path),
            None => false,
        };

        included && !excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selects_media_only() {
        let filter: MediaFilter = MediaFilter::new();
        assert!(filter.matches("Photos from 2019/IMG_0001.jpg"));
        assert!(filter.matches("Photos from 2019/VID_0002.MP4"));
        assert!(!filter.matches("Photos from 2019/metadata.json"));
        assert!(!filter.matches("archive_browser.html"));
    }

    #[test]
    fn test_sidecars_never_selected() {
        let filter: MediaFilter = MediaFilter::all_files();
        assert!(!filter.matches("Photos/IMG_0001.jpg.json"));
        assert!(filter.matches("Photos/notes.txt"));
    }

    #[test]
    fn test_include_patterns() {
        let filter: MediaFilter = MediaFilter::new()
            .with_patterns(vec!["**/*.{heic,mov}".to_string()], vec![])
            .unwrap();
        assert!(filter.matches("Photos/a.heic"));
        assert!(filter.matches("clip.mov"));
        assert!(!filter.matches("Photos/a.jpg"));
    }

    #[test]
    fn test_exclude_patterns() {
        let filter: MediaFilter = MediaFilter::new()
            .with_patterns(vec![], vec!["Trash/**".to_string(), "**/.*".to_string()])
            .unwrap();
        assert!(filter.matches("Photos/a.jpg"));
        assert!(!filter.matches("Trash/a.jpg"));
        assert!(!filter.matches("Photos/.hidden.jpg"));
    }

    #[test]
    fn test_escaped_literal_directory() {
        let pattern: String = format!("{}/**", escape_glob("Album [2019]"));
        let filter: MediaFilter = MediaFilter::new()
            .with_patterns(vec![pattern], vec![])
            .unwrap();
        assert!(filter.matches("Album [2019]/a.jpg"));
        assert!(!filter.matches("Album 2/a.jpg"));
    }

    #[test]
    fn test_skipped_dirs_match_at_any_depth() {
        let filter: MediaFilter = MediaFilter::new()
            .with_patterns(vec![], vec!["**/*.gif".to_string()])
            .unwrap()
            .with_skipped_dirs(&["Trash".to_string(), "Album [2019]".to_string()])
            .unwrap();
        assert!(!filter.matches("Trash/a.jpg"));
        assert!(!filter.matches("Takeout/Google Photos/Album [2019]/a.jpg"));
        assert!(!filter.matches("Photos/a.gif"));
        assert!(filter.matches("Takeout/Google Photos/Album 2/a.jpg"));
        assert!(filter.matches("Photos/Trashcan.jpg"));
        assert_eq!(filter.exclude_patterns().len(), 3);
    }

    #[test]
    fn test_invalid_pattern() {
        let result: Result<MediaFilter, SourceError> =
            MediaFilter::new().with_patterns(vec!["[invalid".to_string()], vec![]);
        assert!(matches!(
            result,
            Err(SourceError::InvalidGlobPattern { .. })
        ));
    }
}
