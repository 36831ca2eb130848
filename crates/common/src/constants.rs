//! Default tuning values shared across media-relay crates.

use std::time::Duration;

/// Concurrent file uploads within one archive.
pub const DEFAULT_FILE_CONCURRENCY: usize = 4;

/// Archives processed at the same time.
pub const DEFAULT_MAX_CONCURRENT_ARCHIVES: usize = 3;

/// Upper bound on a single file's pipeline (existence check, open, upload).
pub const DEFAULT_FILE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Minimum time between two non-forced journal saves.
pub const DEFAULT_JOURNAL_SAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Interval of the background journal saver.
pub const DEFAULT_JOURNAL_PERIODIC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Number of marks between two batch-triggered journal saves.
pub const DEFAULT_JOURNAL_BATCH_THRESHOLD: usize = 100;

/// Minimum time between two progress log lines for one archive.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// Per-file error messages kept in an aggregate failure; the rest are counted.
pub const MAX_REPORTED_ERRORS: usize = 10;

/// Journal file name used when no journal path is configured.
pub const DEFAULT_JOURNAL_FILE_NAME: &str = ".media-relay-journal.json";

/// Content type used when neither the extension nor the metadata names one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Objects at or above this size are sent as multipart uploads (10MB).
pub const MULTIPART_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Part size for multipart uploads (8MB, above the 5MB S3 minimum).
pub const MULTIPART_PART_SIZE: usize = 8 * 1024 * 1024;
