//! Upload driver for one archive.
//!
//! # Pipeline
//!
//! 1. List the archive and record totals
//! 2. Skip files the journal already holds (before they reach the pool)
//! 3. Submit the rest to a bounded [`WorkerPool`]; each file then runs
//!    existence check, open, and upload under the retry policy and a per-file
//!    timeout
//! 4. Record the outcome in the counters, the journal, and the progress reporter
//!
//! A failing file never aborts its siblings. Failures are aggregated into one
//! [`UploadError::FilesFailed`] once every file has been processed.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use media_relay_common::{ByteStream, MetadataMap, MAX_REPORTED_ERRORS};
use media_relay_filesystem::{MediaFile, SourceReader};
use media_relay_storage::{
    resolve_content_type, Classify, Journal, ObjectStore, RetryError, RetryPolicy,
};
use tokio_util::sync::CancellationToken;

use crate::error::{AttemptError, FileFailure, FileStage, UploadError};
use crate::options::UploadOptions;
use crate::pool::{PoolReport, WorkerPool};
use crate::progress::{FileOutcome, ProgressCallback, ProgressReporter};
use crate::stats::{megabytes, RunStatistics, StatisticsSnapshot};

/// Metadata key naming where an object came from.
const SOURCE_METADATA_KEY: &str = "source";

/// Uploads every file of one archive to an object store.
pub struct ArchiveUploader {
    source: Arc<dyn SourceReader>,
    store: Arc<dyn ObjectStore>,
    journal: Option<Journal>,
    options: UploadOptions,
    retry: RetryPolicy,
    statistics: Arc<RunStatistics>,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl ArchiveUploader {
    /// Create an uploader without a journal.
    ///
    /// # Arguments
    /// * `source` - Archive to read from
    /// * `store` - Destination object store
    /// * `options` - Concurrency, retry, and pipeline switches
    pub fn new(
        source: Arc<dyn SourceReader>,
        store: Arc<dyn ObjectStore>,
        options: UploadOptions,
    ) -> Self {
        let retry: RetryPolicy = RetryPolicy::new(options.retry.clone());
        Self {
            source,
            store,
            journal: None,
            options,
            retry,
            statistics: Arc::new(RunStatistics::new()),
            progress: None,
        }
    }

    /// Record uploads in `journal` and skip files it already holds.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Receive an update after every file. The callback can cancel the archive.
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn archive_id(&self) -> &str {
        self.source.archive_id()
    }

    /// Current counters.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }

    /// Upload every file of the archive.
    ///
    /// # Arguments
    /// * `cancel` - Cancelling it stops new submissions and aborts in-flight files
    ///
    /// # Returns
    /// Final counters when every file was uploaded or skipped.
    ///
    /// # Errors
    /// * [`UploadError::Listing`] if the archive cannot be listed
    /// * [`UploadError::FilesFailed`] if any file failed
    /// * [`UploadError::Cancelled`] if the run stopped before every file was processed
    pub async fn run(&self, cancel: &CancellationToken) -> Result<StatisticsSnapshot, UploadError> {
        let archive: String = self.source.archive_id().to_string();
        let files: Vec<MediaFile> =
            self.source
                .list_files()
                .await
                .map_err(|source| UploadError::Listing {
                    archive: archive.clone(),
                    source,
                })?;

        if files.is_empty() {
            tracing::warn!(archive = %archive, "No files found in archive");
            return Ok(self.statistics.snapshot());
        }

        let total_bytes: u64 = files.iter().filter_map(|f: &MediaFile| f.size).sum();
        self.statistics.set_totals(files.len() as u64, total_bytes);
        tracing::info!(
            archive = %archive,
            files = files.len(),
            total_mb = %format!("{:.2}", megabytes(total_bytes)),
            destination = %self.store.describe(),
            concurrency = self.options.file_concurrency,
            dry_run = self.options.dry_run,
            "Starting upload"
        );

        let token: CancellationToken = cancel.child_token();
        let reporter: ProgressReporter = ProgressReporter::new(
            archive.clone(),
            self.statistics.clone(),
            self.options.progress_interval(),
        )
        .with_callback(self.progress.clone());
        let task: Arc<FileTask> = Arc::new(FileTask {
            archive: archive.clone(),
            source: self.source.clone(),
            store: self.store.clone(),
            journal: self.journal.clone(),
            options: self.options.clone(),
            retry: self.retry.clone(),
            statistics: self.statistics.clone(),
            reporter,
            failures: Mutex::new(Vec::new()),
            token: token.clone(),
        });

        let mut pool: WorkerPool = WorkerPool::new(self.options.file_concurrency);
        for file in files {
            if token.is_cancelled() {
                break;
            }

            if self.is_journaled(&file.path) {
                tracing::debug!(archive = %archive, path = %file.path, "Already uploaded, skipping");
                self.statistics.record_skipped();
                task.report(&file.path, FileOutcome::Skipped);
                continue;
            }

            let worker: Arc<FileTask> = task.clone();
            let submitted = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = pool.submit(async move { worker.process(file).await }) => result,
            };
            if submitted.is_err() {
                break;
            }
        }

        let report: PoolReport = pool.wait().await;
        tracing::debug!(
            archive = %archive,
            completed = report.completed,
            panicked = report.panicked,
            peak = pool.peak(),
            "Worker pool drained"
        );

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.save().await {
                tracing::warn!(archive = %archive, error = %e, "Failed to save journal");
            }
        }

        let snapshot: StatisticsSnapshot = task.reporter.finish();
        let failures: Vec<String> = task.take_failures();

        if snapshot.failed > 0 {
            return Err(UploadError::FilesFailed {
                failed: snapshot.failed,
                total: snapshot.total_files,
                messages: summarize_failures(failures),
                statistics: snapshot,
            });
        }

        if token.is_cancelled() && snapshot.processed() < snapshot.total_files {
            return Err(UploadError::Cancelled {
                archive,
                statistics: snapshot,
            });
        }

        Ok(snapshot)
    }

    fn is_journaled(&self, path: &str) -> bool {
        match &self.journal {
            Some(journal) => journal.is_uploaded(path),
            None => false,
        }
    }
}

/// Keep the first messages and count the rest.
fn summarize_failures(mut failures: Vec<String>) -> Vec<String> {
    if failures.len() <= MAX_REPORTED_ERRORS {
        return failures;
    }
    let hidden: usize = failures.len() - MAX_REPORTED_ERRORS;
    failures.truncate(MAX_REPORTED_ERRORS);
    failures.push(format!("... and {} more errors", hidden));
    failures
}

enum FileError {
    Cancelled,
    Failed(FileFailure),
}

/// State shared by the per-file tasks of one archive run.
struct FileTask {
    archive: String,
    source: Arc<dyn SourceReader>,
    store: Arc<dyn ObjectStore>,
    journal: Option<Journal>,
    options: UploadOptions,
    retry: RetryPolicy,
    statistics: Arc<RunStatistics>,
    reporter: ProgressReporter,
    failures: Mutex<Vec<String>>,
    token: CancellationToken,
}

impl FileTask {
    async fn process(&self, file: MediaFile) {
        let path: String = file.path.clone();
        let token: CancellationToken = self.token.child_token();
        let timeout: Duration = self.options.file_timeout();

        let pipeline = AssertUnwindSafe(tokio::time::timeout(
            timeout,
            self.upload_file(file, &token),
        ))
        .catch_unwind();

        let finished = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            finished = pipeline => Some(finished),
        };

        let result: Result<FileOutcome, FileError> = match finished {
            None => Err(FileError::Cancelled),
            Some(Ok(Ok(result))) => result,
            Some(Ok(Err(_elapsed))) => {
                token.cancel();
                Err(FileError::Failed(FileFailure {
                    path: path.clone(),
                    stage: FileStage::Timeout,
                    message: format!("no result after {}s", timeout.as_secs()),
                }))
            }
            Some(Err(_panic)) => Err(FileError::Failed(FileFailure {
                path: path.clone(),
                stage: FileStage::Panic,
                message: "task aborted".to_string(),
            })),
        };

        match result {
            Ok(outcome) => self.report(&path, outcome),
            Err(FileError::Cancelled) => {
                tracing::debug!(archive = %self.archive, path = %path, "Upload cancelled");
            }
            Err(FileError::Failed(failure)) => self.fail(failure),
        }
    }

    async fn upload_file(
        &self,
        file: MediaFile,
        token: &CancellationToken,
    ) -> Result<FileOutcome, FileError> {
        let path: &str = &file.path;

        if self.options.skip_existing {
            let exists: bool = self
                .retry
                .run(token, &format!("check existence of {}", path), || {
                    self.store.object_exists(path)
                })
                .await
                .map_err(|e| stage_error(token, path, FileStage::ExistenceCheck, e))?;

            if exists {
                tracing::debug!(archive = %self.archive, path, "Object already exists, skipping");
                self.statistics.record_skipped();
                self.mark_uploaded(path);
                return Ok(FileOutcome::Skipped);
            }
        }

        let size: Option<u64> = match file.size {
            Some(size) => Some(size),
            None => self.source.get_size(path).await,
        };

        if self.options.dry_run {
            tracing::info!(archive = %self.archive, path, size, "[dry run] Would upload");
            self.statistics.record_uploaded(size.unwrap_or(0));
            self.mark_uploaded(path);
            return Ok(FileOutcome::Uploaded);
        }

        let metadata: MetadataMap = self.object_metadata(&file).await;
        let content_type: String = resolve_content_type(path, &metadata);

        let opened: ByteStream = self
            .retry
            .run(token, &format!("open {}", path), || self.source.open_file(path))
            .await
            .map_err(|e| stage_error(token, path, FileStage::Open, e))?;

        // The first attempt uses the stream opened above, later ones re-open.
        let mut pending: Option<ByteStream> = Some(opened);
        let source: &dyn SourceReader = self.source.as_ref();
        let store: &dyn ObjectStore = self.store.as_ref();
        let metadata: &MetadataMap = &metadata;
        let content_type: &str = &content_type;
        self.retry
            .run(token, &format!("upload {}", path), || {
                let reuse: Option<ByteStream> = pending.take();
                async move {
                    let body: ByteStream = match reuse {
                        Some(body) => body,
                        None => source.open_file(path).await?,
                    };
                    store
                        .upload_object(body, path, size, metadata, content_type)
                        .await?;
                    Ok::<(), AttemptError>(())
                }
            })
            .await
            .map_err(|e| stage_error(token, path, FileStage::Upload, e))?;

        tracing::debug!(archive = %self.archive, path, size, content_type, "Uploaded");
        self.statistics.record_uploaded(size.unwrap_or(0));
        self.mark_uploaded(path);
        Ok(FileOutcome::Uploaded)
    }

    async fn object_metadata(&self, file: &MediaFile) -> MetadataMap {
        if !self.options.preserve_metadata {
            return MetadataMap::new();
        }

        let mut metadata: MetadataMap = match &file.metadata {
            Some(metadata) => metadata.clone(),
            None => self
                .source
                .get_metadata(&file.path)
                .await
                .unwrap_or_default(),
        };
        if !self.options.metadata_source.is_empty() {
            metadata
                .entry(SOURCE_METADATA_KEY.to_string())
                .or_insert_with(|| self.options.metadata_source.clone());
        }
        metadata
    }

    fn mark_uploaded(&self, path: &str) {
        if let Some(journal) = &self.journal {
            journal.mark_uploaded(path, &self.archive);
        }
    }

    fn fail(&self, failure: FileFailure) {
        tracing::error!(archive = %self.archive, path = %failure.path, "{}", failure);
        self.statistics.record_failed();
        let path: String = failure.path.clone();
        self.lock_failures().push(failure.to_string());
        self.report(&path, FileOutcome::Failed);
    }

    fn report(&self, path: &str, outcome: FileOutcome) {
        if !self.reporter.report(path, outcome) && !self.token.is_cancelled() {
            tracing::info!(archive = %self.archive, "Cancellation requested by progress callback");
            self.token.cancel();
        }
    }

    fn lock_failures(&self) -> MutexGuard<'_, Vec<String>> {
        match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn take_failures(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock_failures())
    }
}

fn stage_error<E: Classify>(
    token: &CancellationToken,
    path: &str,
    stage: FileStage,
    err: RetryError<E>,
) -> FileError {
    if err.is_cancelled() || token.is_cancelled() {
        return FileError::Cancelled;
    }
    FileError::Failed(FileFailure {
        path: path.to_string(),
        stage,
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_failures_caps_messages() {
        let failures: Vec<String> = (0..13).map(|i| format!("error {}", i)).collect();
        let summary: Vec<String> = summarize_failures(failures);
        assert_eq!(summary.len(), 11);
        assert_eq!(summary[9], "error 9");
        assert_eq!(summary[10], "... and 3 more errors");
    }

    #[test]
    fn test_summarize_failures_keeps_short_lists() {
        let failures: Vec<String> = vec!["a".into(), "b".into()];
        assert_eq!(summarize_failures(failures.clone()), failures);
    }
}
