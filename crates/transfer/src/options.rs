//! Options shared by the upload driver and the multi-archive scheduler.

use std::path::PathBuf;
use std::time::Duration;

use media_relay_common::{
    DEFAULT_FILE_CONCURRENCY, DEFAULT_FILE_TIMEOUT, DEFAULT_MAX_CONCURRENT_ARCHIVES,
    DEFAULT_PROGRESS_INTERVAL,
};
use media_relay_storage::{JournalSettings, RetrySettings};
use serde::{Deserialize, Serialize};

/// Metadata `source` value added to preserved metadata that names none.
pub const DEFAULT_METADATA_SOURCE: &str = "Google Takeout";

/// Options for an upload run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadOptions {
    /// Concurrent file uploads per archive.
    pub file_concurrency: usize,
    /// Archives processed at the same time.
    pub max_concurrent_archives: usize,
    /// Walk the full pipeline without moving bytes.
    pub dry_run: bool,
    /// Load existing journals and skip recorded files.
    pub resume: bool,
    /// Ask the store whether each object exists before uploading it.
    pub skip_existing: bool,
    /// Attach archive metadata to uploaded objects.
    pub preserve_metadata: bool,
    /// `source` added to preserved metadata that has none. Empty disables.
    pub metadata_source: String,
    /// Per-archive journal location: a directory, or a `.json` file template.
    /// When unset, one shared journal in the home directory is used.
    pub journal_path: Option<PathBuf>,
    /// Upper bound on one file's pipeline, in seconds.
    pub file_timeout_secs: u64,
    /// Minimum time between progress log lines, in milliseconds.
    pub progress_interval_ms: u64,
    pub retry: RetrySettings,
    pub journal: JournalSettings,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            file_concurrency: DEFAULT_FILE_CONCURRENCY,
            max_concurrent_archives: DEFAULT_MAX_CONCURRENT_ARCHIVES,
            dry_run: false,
            resume: true,
            skip_existing: true,
            preserve_metadata: true,
            metadata_source: DEFAULT_METADATA_SOURCE.to_string(),
            journal_path: None,
            file_timeout_secs: DEFAULT_FILE_TIMEOUT.as_secs(),
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL.as_millis() as u64,
            retry: RetrySettings::default(),
            journal: JournalSettings::default(),
        }
    }
}

impl UploadOptions {
    pub fn with_file_concurrency(mut self, n: usize) -> Self {
        self.file_concurrency = n;
        self
    }

    pub fn with_max_concurrent_archives(mut self, n: usize) -> Self {
        self.max_concurrent_archives = n;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    pub fn with_preserve_metadata(mut self, preserve: bool) -> Self {
        self.preserve_metadata = preserve;
        self
    }

    pub fn with_journal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    pub fn with_file_timeout(mut self, timeout: Duration) -> Self {
        self.file_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_journal_settings(mut self, journal: JournalSettings) -> Self {
        self.journal = journal;
        self
    }

    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options: UploadOptions = UploadOptions::default();
        assert_eq!(options.file_concurrency, 4);
        assert_eq!(options.max_concurrent_archives, 3);
        assert!(options.resume);
        assert!(options.preserve_metadata);
        assert!(options.skip_existing);
        assert_eq!(options.file_timeout(), Duration::from_secs(1800));
        assert_eq!(options.progress_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let options: UploadOptions =
            serde_json::from_str(r#"{"file_concurrency": 8, "retry": {"max_retries": 2}}"#).unwrap();
        assert_eq!(options.file_concurrency, 8);
        assert_eq!(options.retry.max_retries, 2);
        assert_eq!(options.retry.initial_backoff_ms, 1000);
        assert_eq!(options.max_concurrent_archives, 3);
    }
}
