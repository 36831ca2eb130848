//! Durable record of which paths have been uploaded.
//!
//! The journal is an in-memory map guarded by a mutex, persisted as a single
//! pretty-printed JSON document. Marks never touch the disk directly; saves are
//! rate-limited, serialized, and written through a temporary file that is
//! renamed into place.
//!
//! # Example
//!
//! ```ignore
//! let journal = Journal::new("/var/lib/media-relay/takeout-001.json", JournalSettings::default());
//! journal.load().await?;
//! let saver = journal.start_periodic_save(&root_token);
//!
//! if !journal.is_uploaded("Photos/a.jpg") {
//!     // upload...
//!     journal.mark_uploaded("Photos/a.jpg", "takeout-001");
//! }
//!
//! saver.stop().await;
//! journal.flush().await?;
//! ```

mod entry;
mod error;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::types::JournalSettings;
use entry::{JournalDocument, JournalDocumentRef};

pub use entry::JournalEntry;
pub use error::JournalError;

/// Counts reported by [`Journal::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JournalStats {
    /// Entries in the journal.
    pub total: usize,
    /// Entries marked uploaded.
    pub uploaded: usize,
}

#[derive(Debug, Default)]
struct JournalState {
    uploads: HashMap<String, JournalEntry>,
    last_save: Option<Instant>,
    marks_since_request: usize,
}

#[derive(Debug)]
struct JournalInner {
    path: PathBuf,
    settings: JournalSettings,
    state: Mutex<JournalState>,
    /// Serializes writers so an older snapshot never lands after a newer one.
    save_lock: tokio::sync::Mutex<()>,
    save_requested: Notify,
}

/// Cloneable handle to an upload journal.
#[derive(Debug, Clone)]
pub struct Journal {
    inner: Arc<JournalInner>,
}

impl Journal {
    /// Create an empty journal backed by `path`. Nothing is read until [`Journal::load`].
    pub fn new(path: impl Into<PathBuf>, settings: JournalSettings) -> Self {
        Self {
            inner: Arc::new(JournalInner {
                path: path.into(),
                settings,
                state: Mutex::new(JournalState::default()),
                save_lock: tokio::sync::Mutex::new(()),
                save_requested: Notify::new(),
            }),
        }
    }

    /// Backing file location.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn settings(&self) -> &JournalSettings {
        &self.inner.settings
    }

    fn path_string(&self) -> String {
        self.inner.path.display().to_string()
    }

    fn lock_state(&self) -> MutexGuard<'_, JournalState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the backing file into memory.
    ///
    /// A missing or empty file is a fresh start. Loaded entries never revert a
    /// path already marked uploaded in memory.
    ///
    /// # Returns
    /// Number of entries read from disk.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a valid journal.
    pub async fn load(&self) -> Result<usize, JournalError> {
        let bytes: Vec<u8> = match tokio::fs::read(&self.inner.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.inner.path.display(), "No existing journal, starting fresh");
                return Ok(0);
            }
            Err(e) => {
                return Err(JournalError::Read {
                    path: self.path_string(),
                    source: e,
                })
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            tracing::info!(path = %self.inner.path.display(), "Journal file is empty, starting fresh");
            return Ok(0);
        }

        let document: JournalDocument =
            serde_json::from_slice(&bytes).map_err(|e| JournalError::Corrupt {
                path: self.path_string(),
                source: e,
            })?;
        let loaded: HashMap<String, JournalEntry> = document.uploads.unwrap_or_default();
        let count: usize = loaded.len();

        {
            let mut state: MutexGuard<'_, JournalState> = self.lock_state();
            for (path, entry) in loaded {
                let already_uploaded: bool =
                    state.uploads.get(&path).is_some_and(|e: &JournalEntry| e.uploaded);
                if !already_uploaded {
                    state.uploads.insert(path, entry);
                }
            }
        }

        tracing::info!(path = %self.inner.path.display(), entries = count, "Loaded journal");
        Ok(count)
    }

    /// Whether `path` has been recorded as uploaded.
    pub fn is_uploaded(&self, path: &str) -> bool {
        self.lock_state()
            .uploads
            .get(path)
            .is_some_and(|entry: &JournalEntry| entry.uploaded)
    }

    /// Full record for `path`, if any.
    pub fn entry(&self, path: &str) -> Option<JournalEntry> {
        self.lock_state().uploads.get(path).cloned()
    }

    /// Record `path` as uploaded from `archive_id`.
    ///
    /// Idempotent. Every `batch_threshold` marks request a background save;
    /// the caller never waits on disk I/O.
    pub fn mark_uploaded(&self, path: &str, archive_id: &str) {
        let threshold: usize = self.inner.settings.batch_threshold;
        let request_save: bool = {
            let mut state: MutexGuard<'_, JournalState> = self.lock_state();
            state
                .uploads
                .insert(path.to_string(), JournalEntry::uploaded(path, archive_id));
            state.marks_since_request += 1;
            if threshold > 0 && state.marks_since_request >= threshold {
                state.marks_since_request = 0;
                true
            } else {
                false
            }
        };

        if request_save {
            tracing::debug!(path = %self.inner.path.display(), "Batch threshold reached, requesting journal save");
            self.inner.save_requested.notify_one();
        }
    }

    /// Save unless the previous save was less than `save_interval` ago.
    ///
    /// # Returns
    /// `true` if the journal was written, `false` if the call was rate-limited.
    ///
    /// # Errors
    /// Returns error if the document cannot be written.
    pub async fn save(&self) -> Result<bool, JournalError> {
        self.persist(false).await
    }

    /// Save unconditionally.
    ///
    /// # Errors
    /// Returns error if the document cannot be written.
    pub async fn flush(&self) -> Result<(), JournalError> {
        self.persist(true).await.map(|_| ())
    }

    async fn persist(&self, force: bool) -> Result<bool, JournalError> {
        let _writer = self.inner.save_lock.lock().await;
        let interval: Duration = self.inner.settings.save_interval();

        let (bytes, entries): (Vec<u8>, usize) = {
            let state: MutexGuard<'_, JournalState> = self.lock_state();
            if !force && !state.uploads.is_empty() {
                if let Some(last) = state.last_save {
                    if last.elapsed() < interval {
                        return Ok(false);
                    }
                }
            }

            let document: JournalDocumentRef<'_> = JournalDocumentRef {
                uploads: state
                    .uploads
                    .iter()
                    .map(|(path, entry)| (path.as_str(), entry))
                    .collect::<BTreeMap<&str, &JournalEntry>>(),
            };
            let bytes: Vec<u8> =
                serde_json::to_vec_pretty(&document).map_err(|e| JournalError::Encode {
                    path: self.path_string(),
                    source: e,
                })?;
            (bytes, state.uploads.len())
        };

        write_atomically(&self.inner.path, &bytes)
            .await
            .map_err(|e| JournalError::Write {
                path: self.path_string(),
                source: e,
            })?;

        self.lock_state().last_save = Some(Instant::now());
        tracing::debug!(path = %self.inner.path.display(), entries, "Saved journal");
        Ok(true)
    }

    /// Entry counts.
    pub fn stats(&self) -> JournalStats {
        let state: MutexGuard<'_, JournalState> = self.lock_state();
        JournalStats {
            total: state.uploads.len(),
            uploaded: state.uploads.values().filter(|e| e.uploaded).count(),
        }
    }

    /// Paths marked uploaded, sorted.
    pub fn list_completed(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .lock_state()
            .uploads
            .values()
            .filter(|e| e.uploaded)
            .map(|e| e.path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Forget every entry and persist the empty journal.
    ///
    /// # Errors
    /// Returns error if the empty document cannot be written.
    pub async fn clear(&self) -> Result<(), JournalError> {
        {
            let mut state: MutexGuard<'_, JournalState> = self.lock_state();
            state.uploads.clear();
            state.marks_since_request = 0;
        }
        tracing::info!(path = %self.inner.path.display(), "Cleared journal");
        self.flush().await
    }

    /// Start the background saver.
    ///
    /// The task saves every `periodic_interval` and whenever the batch
    /// threshold requests it. It stops when `parent` is cancelled or when the
    /// returned handle is stopped or dropped.
    pub fn start_periodic_save(&self, parent: &CancellationToken) -> PeriodicSave {
        let token: CancellationToken = parent.child_token();
        let journal: Journal = self.clone();
        let task_token: CancellationToken = token.clone();
        let handle: JoinHandle<()> = tokio::spawn(async move {
            journal.run_saver(task_token).await;
        });

        PeriodicSave {
            token,
            handle: Some(handle),
        }
    }

    async fn run_saver(&self, token: CancellationToken) {
        let period: Duration = self
            .inner
            .settings
            .periodic_interval()
            .max(Duration::from_millis(1));
        let mut ticker: tokio::time::Interval =
            tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(path = %self.inner.path.display(), "Periodic journal save stopped");
                    return;
                }
                _ = ticker.tick() => self.save_in_background("periodic").await,
                _ = self.inner.save_requested.notified() => self.save_in_background("batch").await,
            }
        }
    }

    async fn save_in_background(&self, reason: &str) {
        match self.save().await {
            Ok(true) => tracing::debug!(reason, "Background journal save complete"),
            Ok(false) => {}
            Err(e) => tracing::error!(reason, "Background journal save failed: {}", e),
        }
    }
}

/// Handle to a running background saver.
///
/// Dropping the handle cancels the task without waiting for it.
#[derive(Debug)]
pub struct PeriodicSave {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicSave {
    /// Cancel the saver and wait for it to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    tracing::error!("Periodic journal save task panicked");
                }
            }
        }
    }
}

impl Drop for PeriodicSave {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Write `bytes` to a sibling temporary file, then rename it over `path`.
async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut tmp_name: std::ffi::OsString = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "journal".into());
    tmp_name.push(".tmp");
    let tmp_path: PathBuf = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}
