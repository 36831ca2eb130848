//! Error types for archive uploads and the multi-archive scheduler.

use std::fmt;

use media_relay_common::PathError;
use media_relay_filesystem::SourceError;
use media_relay_storage::{Classify, ErrorClass, JournalError, StorageError};
use thiserror::Error;

use crate::stats::StatisticsSnapshot;

/// Pipeline stage at which a file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStage {
    ExistenceCheck,
    Open,
    Upload,
    Timeout,
    Panic,
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: &str = match self {
            FileStage::ExistenceCheck => "failed to check if file exists",
            FileStage::Open => "failed to open file",
            FileStage::Upload => "failed to upload file",
            FileStage::Timeout => "timed out",
            FileStage::Panic => "upload task panicked",
        };
        f.write_str(text)
    }
}

/// A single file that could not be uploaded. Sibling files are unaffected.
#[derive(Error, Debug, Clone)]
#[error("failed to upload {path}: {stage}: {message}")]
pub struct FileFailure {
    pub path: String,
    pub stage: FileStage,
    pub message: String,
}

/// Errors returned by [`ArchiveUploader::run`](crate::ArchiveUploader::run).
#[derive(Error, Debug)]
pub enum UploadError {
    /// The archive listing could not be produced.
    #[error("failed to list archive {archive}: {source}")]
    Listing {
        archive: String,
        #[source]
        source: SourceError,
    },

    /// One or more files failed; the rest were processed.
    #[error("upload completed with {failed}/{total} files failed:\n{}", .messages.join("\n"))]
    FilesFailed {
        failed: u64,
        total: u64,
        /// At most ten messages, plus a trailing "... and N more errors" line.
        messages: Vec<String>,
        statistics: StatisticsSnapshot,
    },

    /// The run was cancelled before every file was processed.
    #[error("upload of archive {archive} cancelled")]
    Cancelled {
        archive: String,
        statistics: StatisticsSnapshot,
    },
}

impl UploadError {
    /// Counters at the time the run ended, when any file was processed.
    pub fn statistics(&self) -> Option<&StatisticsSnapshot> {
        match self {
            UploadError::Listing { .. } => None,
            UploadError::FilesFailed { statistics, .. } => Some(statistics),
            UploadError::Cancelled { statistics, .. } => Some(statistics),
        }
    }
}

/// One archive that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFailure {
    pub archive: String,
    pub message: String,
}

impl fmt::Display for ArchiveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "archive {}: {}", self.archive, self.message)
    }
}

/// Errors returned by [`ArchiveScheduler::run`](crate::ArchiveScheduler::run).
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Fatal setup error: the shared journal could not be loaded.
    #[error("failed to load shared journal: {0}")]
    Journal(#[from] JournalError),

    /// Fatal setup error: no journal location could be determined.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Every archive ran, some of them failed.
    #[error("{} of {} archives failed:\n{}", .failures.len(), .summary.archives.len(), join_failures(.failures))]
    ArchivesFailed {
        failures: Vec<ArchiveFailure>,
        summary: crate::scheduler::RunSummary,
    },
}

fn join_failures(failures: &[ArchiveFailure]) -> String {
    failures
        .iter()
        .map(ArchiveFailure::to_string)
        .collect::<Vec<String>>()
        .join("\n")
}

/// Failure of one upload attempt, which may have re-opened the source.
#[derive(Error, Debug)]
pub(crate) enum AttemptError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StorageError),
}

impl Classify for AttemptError {
    fn error_class(&self) -> Option<ErrorClass> {
        match self {
            AttemptError::Source(e) => e.error_class(),
            AttemptError::Store(e) => e.error_class(),
        }
    }
}
