//! Multi-archive scheduler.
//!
//! Runs one [`ArchiveUploader`] per archive with at most
//! `max_concurrent_archives` in flight. Each archive gets its own child
//! cancellation token and, unless a shared journal is used, its own journal
//! with a background saver. Archives that resolve to the same journal file
//! share one loaded journal and one saver. Cleanup (stop the saver, flush the
//! journal) runs whether the archive succeeded, failed, or panicked, and a
//! failing archive never stops the others.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::FutureExt;
use media_relay_common::{archive_journal_path, default_journal_path, PathError};
use media_relay_filesystem::{ArchiveInput, SourceOpener, SourceReader};
use media_relay_storage::{Journal, ObjectStore, PeriodicSave, RetryPolicy};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{ArchiveFailure, SchedulerError, UploadError};
use crate::options::UploadOptions;
use crate::progress::ProgressCallback;
use crate::stats::{megabytes, StatisticsSnapshot};
use crate::upload::ArchiveUploader;

/// Where upload journals live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalLayout {
    /// One journal for every archive, loaded once and saved by one background task.
    Shared(PathBuf),
    /// One journal per archive under a directory or `.json` file template.
    PerArchive(PathBuf),
}

impl JournalLayout {
    /// Per-archive journals under `journal_path` when set, otherwise the shared
    /// journal in the home directory.
    ///
    /// # Errors
    /// Returns error if no journal path is set and the home directory is unknown.
    pub fn from_options(options: &UploadOptions) -> Result<Self, PathError> {
        match &options.journal_path {
            Some(path) => Ok(JournalLayout::PerArchive(path.clone())),
            None => Ok(JournalLayout::Shared(default_journal_path()?)),
        }
    }

    /// Journal file used for `archive`.
    pub fn journal_path(&self, archive: &str) -> PathBuf {
        match self {
            JournalLayout::Shared(path) => path.clone(),
            JournalLayout::PerArchive(base) => archive_journal_path(base, archive),
        }
    }
}

/// Outcome of one archive.
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub name: String,
    pub path: PathBuf,
    pub statistics: StatisticsSnapshot,
    /// Failure message when the archive did not complete.
    pub error: Option<String>,
}

impl ArchiveSummary {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a scheduler run, in input order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub archives: Vec<ArchiveSummary>,
    pub totals: StatisticsSnapshot,
    pub elapsed: Duration,
}

/// Runs archive uploads with bounded concurrency.
pub struct ArchiveScheduler {
    store: Arc<dyn ObjectStore>,
    opener: Arc<dyn SourceOpener>,
    options: UploadOptions,
    retry: RetryPolicy,
    layout: Option<JournalLayout>,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl ArchiveScheduler {
    /// Create a scheduler.
    ///
    /// # Arguments
    /// * `store` - Destination shared by every archive
    /// * `opener` - Turns discovered archives into readers
    /// * `options` - Run options; the journal layout is derived from them
    pub fn new(
        store: Arc<dyn ObjectStore>,
        opener: Arc<dyn SourceOpener>,
        options: UploadOptions,
    ) -> Self {
        let retry: RetryPolicy = RetryPolicy::new(options.retry.clone());
        Self {
            store,
            opener,
            options,
            retry,
            layout: None,
            progress: None,
        }
    }

    /// Override the journal layout derived from the options.
    pub fn with_journal_layout(mut self, layout: JournalLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Forward per-file progress of every archive to `callback`.
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Upload every archive.
    ///
    /// # Arguments
    /// * `archives` - Archives in the order they should start
    /// * `cancel` - Root token; cancelling it stops every archive
    ///
    /// # Returns
    /// Per-archive and total counters when every archive completed.
    ///
    /// # Errors
    /// * [`SchedulerError::Journal`] / [`SchedulerError::Path`] on fatal setup errors
    /// * [`SchedulerError::ArchivesFailed`] after all archives ran, if any failed
    pub async fn run(
        &self,
        archives: Vec<ArchiveInput>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, SchedulerError> {
        let started: Instant = Instant::now();
        let layout: JournalLayout = match &self.layout {
            Some(layout) => layout.clone(),
            None => JournalLayout::from_options(&self.options)?,
        };

        let shared: Option<Journal> = match &layout {
            JournalLayout::Shared(path) => {
                let journal: Journal = Journal::new(path.clone(), self.options.journal.clone());
                if self.options.resume {
                    let loaded: usize = journal.load().await?;
                    tracing::info!(path = %path.display(), entries = loaded, "Loaded shared journal");
                }
                Some(journal)
            }
            JournalLayout::PerArchive(_) => None,
        };
        let shared_saver: Option<PeriodicSave> =
            shared.as_ref().map(|j: &Journal| j.start_periodic_save(cancel));

        let context: Arc<SchedulerContext> = Arc::new(SchedulerContext {
            store: self.store.clone(),
            opener: self.opener.clone(),
            options: self.options.clone(),
            retry: self.retry.clone(),
            layout,
            shared: shared.clone(),
            open_journals: tokio::sync::Mutex::new(HashMap::new()),
            progress: self.progress.clone(),
            slots: Arc::new(Semaphore::new(self.options.max_concurrent_archives.max(1))),
            failures: Mutex::new(Vec::new()),
        });

        tracing::info!(
            archives = archives.len(),
            max_concurrent = self.options.max_concurrent_archives.max(1),
            destination = %self.store.describe(),
            "Processing archives"
        );

        let mut tasks: JoinSet<(usize, ArchiveSummary)> = JoinSet::new();
        for (index, archive) in archives.into_iter().enumerate() {
            let ctx: Arc<SchedulerContext> = context.clone();
            let root: CancellationToken = cancel.clone();
            tasks.spawn(async move {
                let summary: ArchiveSummary = ctx.run_archive(index, archive, &root).await;
                (index, summary)
            });
        }

        let mut summaries: Vec<(usize, ArchiveSummary)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::error!(error = %e, "Archive task did not complete"),
            }
        }
        summaries.sort_by_key(|(index, _)| *index);

        if let Some(saver) = shared_saver {
            saver.stop().await;
        }
        if let Some(journal) = &shared {
            if let Err(e) = journal.flush().await {
                tracing::error!(path = %journal.path().display(), error = %e, "Failed to flush shared journal");
            }
        }

        let mut summary: RunSummary = RunSummary {
            archives: summaries.into_iter().map(|(_, s)| s).collect(),
            totals: StatisticsSnapshot::default(),
            elapsed: started.elapsed(),
        };
        for archive in &summary.archives {
            summary.totals.merge(&archive.statistics);
        }

        tracing::info!(
            archives = summary.archives.len(),
            uploaded = summary.totals.uploaded,
            skipped = summary.totals.skipped,
            failed = summary.totals.failed,
            uploaded_mb = %format!("{:.2}", megabytes(summary.totals.uploaded_bytes)),
            elapsed_s = summary.elapsed.as_secs(),
            "All archives processed"
        );

        let failures: Vec<ArchiveFailure> = context.take_failures();
        if !failures.is_empty() {
            return Err(SchedulerError::ArchivesFailed { failures, summary });
        }
        Ok(summary)
    }
}

/// Failure of one archive, with whatever counters it produced.
struct ArchiveError {
    statistics: StatisticsSnapshot,
    message: String,
}

impl ArchiveError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            statistics: StatisticsSnapshot::default(),
            message: message.into(),
        }
    }
}

impl From<UploadError> for ArchiveError {
    fn from(e: UploadError) -> Self {
        Self {
            statistics: e.statistics().copied().unwrap_or_default(),
            message: e.to_string(),
        }
    }
}

/// A per-archive journal and the archives currently using it.
struct OpenJournal {
    journal: Journal,
    saver: PeriodicSave,
    users: usize,
}

struct SchedulerContext {
    store: Arc<dyn ObjectStore>,
    opener: Arc<dyn SourceOpener>,
    options: UploadOptions,
    retry: RetryPolicy,
    layout: JournalLayout,
    shared: Option<Journal>,
    /// Per-archive journals keyed by file, so two archives with the same
    /// name never write one file from two journals.
    open_journals: tokio::sync::Mutex<HashMap<PathBuf, OpenJournal>>,
    progress: Option<Arc<dyn ProgressCallback>>,
    slots: Arc<Semaphore>,
    failures: Mutex<Vec<(usize, ArchiveFailure)>>,
}

impl SchedulerContext {
    async fn run_archive(
        &self,
        index: usize,
        archive: ArchiveInput,
        root: &CancellationToken,
    ) -> ArchiveSummary {
        let result: Result<StatisticsSnapshot, ArchiveError> = tokio::select! {
            biased;
            _ = root.cancelled() => Err(ArchiveError::new("cancelled before start")),
            permit = self.slots.clone().acquire_owned() => match permit {
                Ok(permit) => self.run_with_slot(permit, &archive, root).await,
                Err(_) => Err(ArchiveError::new("scheduler closed")),
            },
        };

        match result {
            Ok(statistics) => ArchiveSummary {
                name: archive.name,
                path: archive.path,
                statistics,
                error: None,
            },
            Err(e) => {
                tracing::error!(archive = %archive.name, error = %e.message, "Archive failed");
                self.record_failure(index, &archive.name, &e.message);
                ArchiveSummary {
                    name: archive.name,
                    path: archive.path,
                    statistics: e.statistics,
                    error: Some(e.message),
                }
            }
        }
    }

    async fn run_with_slot(
        &self,
        _permit: OwnedSemaphorePermit,
        archive: &ArchiveInput,
        root: &CancellationToken,
    ) -> Result<StatisticsSnapshot, ArchiveError> {
        let token: CancellationToken = root.child_token();
        tracing::info!(archive = %archive.name, path = %archive.path.display(), "Processing archive");

        let (journal, journal_path): (Journal, Option<PathBuf>) = match &self.shared {
            Some(journal) => (journal.clone(), None),
            None => {
                let path: PathBuf = self.layout.journal_path(&archive.name);
                let journal: Journal = self.acquire_journal(&path, &archive.name, root).await?;
                (journal, Some(path))
            }
        };

        let outcome = AssertUnwindSafe(self.upload(archive, journal.clone(), &token))
            .catch_unwind()
            .await;

        if let Some(path) = &journal_path {
            self.release_journal(path).await;
        }
        if let Err(e) = journal.flush().await {
            tracing::error!(archive = %archive.name, error = %e, "Failed to flush journal");
        }
        token.cancel();

        match outcome {
            Ok(result) => result,
            Err(panic) => Err(ArchiveError::new(format!(
                "archive task panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    /// Open the journal at `path`, or join the archive already using it.
    async fn acquire_journal(
        &self,
        path: &Path,
        archive: &str,
        root: &CancellationToken,
    ) -> Result<Journal, ArchiveError> {
        let mut open: tokio::sync::MutexGuard<'_, HashMap<PathBuf, OpenJournal>> =
            self.open_journals.lock().await;
        if let Some(entry) = open.get_mut(path) {
            entry.users += 1;
            tracing::info!(archive = %archive, path = %path.display(), "Sharing journal with another archive");
            return Ok(entry.journal.clone());
        }

        let journal: Journal = Journal::new(path, self.options.journal.clone());
        if self.options.resume {
            let loaded: usize = journal
                .load()
                .await
                .map_err(|e| ArchiveError::new(e.to_string()))?;
            tracing::info!(archive = %archive, entries = loaded, "Loaded journal");
        }
        let saver: PeriodicSave = journal.start_periodic_save(root);
        open.insert(
            path.to_path_buf(),
            OpenJournal {
                journal: journal.clone(),
                saver,
                users: 1,
            },
        );
        Ok(journal)
    }

    /// Drop one user of the journal at `path`; the last one stops its saver.
    async fn release_journal(&self, path: &Path) {
        let saver: Option<PeriodicSave> = {
            let mut open: tokio::sync::MutexGuard<'_, HashMap<PathBuf, OpenJournal>> =
                self.open_journals.lock().await;
            match open.get_mut(path) {
                Some(entry) if entry.users > 1 => {
                    entry.users -= 1;
                    None
                }
                Some(_) => open.remove(path).map(|entry: OpenJournal| entry.saver),
                None => None,
            }
        };
        if let Some(saver) = saver {
            saver.stop().await;
        }
    }

    async fn upload(
        &self,
        archive: &ArchiveInput,
        journal: Journal,
        token: &CancellationToken,
    ) -> Result<StatisticsSnapshot, ArchiveError> {
        let source: Arc<dyn SourceReader> = self
            .opener
            .open(archive)
            .await
            .map_err(|e| ArchiveError::new(format!("failed to open archive: {}", e)))?;

        let mut uploader: ArchiveUploader =
            ArchiveUploader::new(source, self.store.clone(), self.options.clone())
                .with_retry_policy(self.retry.clone())
                .with_journal(journal);
        if let Some(callback) = &self.progress {
            uploader = uploader.with_progress(callback.clone());
        }

        Ok(uploader.run(token).await?)
    }

    fn lock_failures(&self) -> MutexGuard<'_, Vec<(usize, ArchiveFailure)>> {
        match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record_failure(&self, index: usize, archive: &str, message: &str) {
        self.lock_failures().push((
            index,
            ArchiveFailure {
                archive: archive.to_string(),
                message: message.to_string(),
            },
        ));
    }

    fn take_failures(&self) -> Vec<ArchiveFailure> {
        let mut failures: Vec<(usize, ArchiveFailure)> = std::mem::take(&mut *self.lock_failures());
        failures.sort_by_key(|(index, _)| *index);
        failures.into_iter().map(|(_, f)| f).collect()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
