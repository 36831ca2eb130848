//! Resumable, concurrent archive uploads.
//!
//! - **Driver** - [`ArchiveUploader`] uploads one archive through a bounded
//!   [`WorkerPool`], skipping journaled files and retrying transient errors
//! - **Scheduler** - [`ArchiveScheduler`] runs several archives at once with
//!   per-archive journals, cancellation, and panic isolation
//! - **Progress** - throttled progress logging and a cancelling callback

mod error;
mod options;
mod pool;
mod progress;
mod scheduler;
mod stats;
mod upload;

pub use error::{ArchiveFailure, FileFailure, FileStage, SchedulerError, UploadError};
pub use options::{UploadOptions, DEFAULT_METADATA_SOURCE};
pub use pool::{PoolClosed, PoolReport, WorkerPool};
pub use progress::{FileOutcome, ProgressCallback, ProgressReporter, UploadProgress};
pub use scheduler::{ArchiveScheduler, ArchiveSummary, JournalLayout, RunSummary};
pub use stats::{megabytes, RunStatistics, StatisticsSnapshot};
pub use upload::ArchiveUploader;
