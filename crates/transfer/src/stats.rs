//! Per-archive counters and run-level totals.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one archive, updated concurrently by upload tasks.
#[derive(Debug, Default)]
pub struct RunStatistics {
    total_files: AtomicU64,
    total_bytes: AtomicU64,
    uploaded: AtomicU64,
    uploaded_bytes: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the size of the listing.
    pub fn set_totals(&self, files: u64, bytes: u64) {
        self.total_files.store(files, Ordering::Relaxed);
        self.total_bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn record_uploaded(&self, bytes: u64) {
        self.uploaded.fetch_add(1, Ordering::Relaxed);
        self.uploaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total_files: self.total_files.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            uploaded_bytes: self.uploaded_bytes.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`RunStatistics`], mergeable across archives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub total_files: u64,
    pub total_bytes: u64,
    pub uploaded: u64,
    pub uploaded_bytes: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl StatisticsSnapshot {
    /// Files that reached a terminal state.
    pub fn processed(&self) -> u64 {
        self.uploaded + self.skipped + self.failed
    }

    /// Merge another snapshot into this one.
    pub fn merge(&mut self, other: &StatisticsSnapshot) {
        self.total_files += other.total_files;
        self.total_bytes += other.total_bytes;
        self.uploaded += other.uploaded;
        self.uploaded_bytes += other.uploaded_bytes;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Bytes as mebibytes for log lines.
pub fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let stats: RunStatistics = RunStatistics::new();
        stats.set_totals(4, 300);
        stats.record_uploaded(100);
        stats.record_uploaded(50);
        stats.record_skipped();
        stats.record_failed();

        let snapshot: StatisticsSnapshot = stats.snapshot();
        assert_eq!(snapshot.uploaded, 2);
        assert_eq!(snapshot.uploaded_bytes, 150);
        assert_eq!(snapshot.processed(), 4);
        assert_eq!(snapshot.total_files, 4);
    }

    #[test]
    fn test_merge() {
        let mut total: StatisticsSnapshot = StatisticsSnapshot::default();
        let a: StatisticsSnapshot = StatisticsSnapshot {
            total_files: 2,
            uploaded: 2,
            uploaded_bytes: 10,
            ..Default::default()
        };
        let b: StatisticsSnapshot = StatisticsSnapshot {
            total_files: 3,
            skipped: 1,
            failed: 2,
            ..Default::default()
        };
        total.merge(&a);
        total.merge(&b);

        assert_eq!(total.total_files, 5);
        assert_eq!(total.processed(), 5);
        assert_eq!(total.uploaded_bytes, 10);
    }
}
