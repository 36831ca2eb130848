//! Progress reporting for one archive.
//!
//! [`ProgressReporter`] logs a throttled progress line (percentage, counts, ETA)
//! and forwards every file outcome to an optional [`ProgressCallback`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::stats::{megabytes, RunStatistics, StatisticsSnapshot};

/// Terminal state of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Uploaded,
    Skipped,
    Failed,
}

/// Progress update delivered to a [`ProgressCallback`].
#[derive(Debug, Clone)]
pub struct UploadProgress {
    pub archive: String,
    /// File whose outcome triggered this update.
    pub path: String,
    pub outcome: FileOutcome,
    pub statistics: StatisticsSnapshot,
    pub elapsed: Duration,
}

impl UploadProgress {
    /// Processed files as a percentage of the listing.
    pub fn percent(&self) -> f64 {
        if self.statistics.total_files == 0 {
            return 100.0;
        }
        self.statistics.processed() as f64 / self.statistics.total_files as f64 * 100.0
    }

    /// Estimated time until every file is processed.
    ///
    /// `None` until at least one file was uploaded.
    pub fn eta(&self) -> Option<Duration> {
        let processed: u64 = self.statistics.processed();
        if self.statistics.uploaded == 0 || processed == 0 {
            return None;
        }
        let remaining: u64 = self.statistics.total_files.saturating_sub(processed);
        let per_file: Duration = self.elapsed / processed as u32;
        Some(per_file * remaining as u32)
    }
}

/// Callback trait for progress reporting.
pub trait ProgressCallback: Send + Sync {
    /// Called after every file outcome.
    /// Returns false to cancel the archive.
    fn on_progress(&self, progress: &UploadProgress) -> bool;
}

/// Throttled progress logger for one archive.
pub struct ProgressReporter {
    archive: String,
    statistics: Arc<RunStatistics>,
    interval: Duration,
    started: Instant,
    last_log: Mutex<Option<Instant>>,
    callback: Option<Arc<dyn ProgressCallback>>,
}

impl ProgressReporter {
    pub fn new(archive: impl Into<String>, statistics: Arc<RunStatistics>, interval: Duration) -> Self {
        Self {
            archive: archive.into(),
            statistics,
            interval,
            started: Instant::now(),
            last_log: Mutex::new(None),
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: Option<Arc<dyn ProgressCallback>>) -> Self {
        self.callback = callback;
        self
    }

    /// Report one file outcome.
    ///
    /// # Returns
    /// `false` if the callback asked to cancel the archive.
    pub fn report(&self, path: &str, outcome: FileOutcome) -> bool {
        let progress: UploadProgress = UploadProgress {
            archive: self.archive.clone(),
            path: path.to_string(),
            outcome,
            statistics: self.statistics.snapshot(),
            elapsed: self.started.elapsed(),
        };

        if self.should_log() {
            let eta: String = match progress.eta() {
                Some(eta) => format!("{}s", eta.as_secs()),
                None => "unknown".to_string(),
            };
            tracing::info!(
                archive = %self.archive,
                "Progress: {:.1}% ({}/{}, {} uploaded, {} skipped, {} errors) ETA: {}",
                progress.percent(),
                progress.statistics.processed(),
                progress.statistics.total_files,
                progress.statistics.uploaded,
                progress.statistics.skipped,
                progress.statistics.failed,
                eta
            );
        }

        match &self.callback {
            Some(callback) => callback.on_progress(&progress),
            None => true,
        }
    }

    fn should_log(&self) -> bool {
        let mut last_log = match self.last_log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now: Instant = Instant::now();
        let due: bool = match *last_log {
            Some(previous) => now.duration_since(previous) >= self.interval,
            None => true,
        };
        if due {
            *last_log = Some(now);
        }
        due
    }

    /// Log the final summary line for the archive.
    pub fn finish(&self) -> StatisticsSnapshot {
        let snapshot: StatisticsSnapshot = self.statistics.snapshot();
        let elapsed: Duration = self.started.elapsed();
        let rate: f64 = if elapsed.as_secs_f64() > 0.0 {
            megabytes(snapshot.uploaded_bytes) / elapsed.as_secs_f64()
        } else {
            0.0
        };
        tracing::info!(
            archive = %self.archive,
            total = snapshot.total_files,
            uploaded = snapshot.uploaded,
            skipped = snapshot.skipped,
            failed = snapshot.failed,
            uploaded_mb = %format!("{:.2}", megabytes(snapshot.uploaded_bytes)),
            rate_mb_s = %format!("{:.2}", rate),
            elapsed_s = elapsed.as_secs(),
            "Upload complete"
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CancelAfter {
        limit: usize,
        seen: AtomicUsize,
    }

    impl ProgressCallback for CancelAfter {
        fn on_progress(&self, _progress: &UploadProgress) -> bool {
            self.seen.fetch_add(1, Ordering::SeqCst) + 1 < self.limit
        }
    }

    #[test]
    fn test_percent_and_eta() {
        let progress: UploadProgress = UploadProgress {
            archive: "a".into(),
            path: "x.jpg".into(),
            outcome: FileOutcome::Uploaded,
            statistics: StatisticsSnapshot {
                total_files: 10,
                uploaded: 4,
                skipped: 1,
                ..Default::default()
            },
            elapsed: Duration::from_secs(10),
        };
        assert_eq!(progress.percent(), 50.0);
        assert_eq!(progress.eta(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_eta_unknown_without_uploads() {
        let progress: UploadProgress = UploadProgress {
            archive: "a".into(),
            path: "x.jpg".into(),
            outcome: FileOutcome::Skipped,
            statistics: StatisticsSnapshot {
                total_files: 10,
                skipped: 3,
                ..Default::default()
            },
            elapsed: Duration::from_secs(3),
        };
        assert_eq!(progress.eta(), None);
    }

    #[test]
    fn test_callback_can_cancel() {
        let stats: Arc<RunStatistics> = Arc::new(RunStatistics::new());
        let callback: Arc<dyn ProgressCallback> = Arc::new(CancelAfter {
            limit: 2,
            seen: AtomicUsize::new(0),
        });
        let reporter: ProgressReporter =
            ProgressReporter::new("a", stats, Duration::from_secs(2)).with_callback(Some(callback));

        assert!(reporter.report("1.jpg", FileOutcome::Uploaded));
        assert!(!reporter.report("2.jpg", FileOutcome::Uploaded));
    }

    #[test]
    fn test_log_throttling() {
        let stats: Arc<RunStatistics> = Arc::new(RunStatistics::new());
        let reporter: ProgressReporter = ProgressReporter::new("a", stats, Duration::from_secs(60));
        assert!(reporter.should_log());
        assert!(!reporter.should_log());
    }
}
