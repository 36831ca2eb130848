//! In-memory object store and archive doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use media_relay_common::{byte_stream, ByteStream, MetadataMap};
use media_relay_filesystem::{ArchiveInput, MediaFile, SourceError, SourceOpener, SourceReader};
use media_relay_storage::{ObjectStore, RetrySettings, StorageError};
use media_relay_transfer::UploadOptions;
use tokio::io::AsyncReadExt;

/// Retry settings with millisecond backoff so retries do not slow tests down.
pub fn fast_retry(max_retries: u32) -> RetrySettings {
    RetrySettings {
        max_retries,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        backoff_multiplier: 2.0,
    }
}

pub fn test_options() -> UploadOptions {
    UploadOptions::default().with_retry(fast_retry(3))
}

/// One object as the store received it.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub size: Option<u64>,
    pub metadata: MetadataMap,
    pub content_type: String,
}

/// Object store that keeps uploads in memory and can fail on demand.
#[derive(Default)]
pub struct TestObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    existing: Mutex<HashSet<String>>,
    failures: Mutex<HashMap<String, VecDeque<StorageError>>>,
    always_fail: Mutex<HashMap<String, StorageError>>,
    attempts: Mutex<HashMap<String, u32>>,
    exists_calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    active_archives: Mutex<HashMap<String, usize>>,
    peak_archives: AtomicUsize,
}

struct ActiveUpload<'a> {
    store: &'a TestObjectStore,
    archive: String,
}

impl Drop for ActiveUpload<'_> {
    fn drop(&mut self) {
        self.store.active.fetch_sub(1, Ordering::SeqCst);
        let mut archives = self.store.active_archives.lock().unwrap();
        if let Some(count) = archives.get_mut(&self.archive) {
            *count -= 1;
            if *count == 0 {
                archives.remove(&self.archive);
            }
        }
    }
}

impl TestObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `key` as already present.
    pub fn with_existing(self, key: &str) -> Self {
        self.existing.lock().unwrap().insert(key.to_string());
        self
    }

    /// Sleep this long inside every upload.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Fail the next uploads of `key` with these errors, in order.
    pub fn fail_next(&self, key: &str, errors: Vec<StorageError>) {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), errors.into());
    }

    /// Fail every upload of `key` with `error`.
    pub fn fail_always(&self, key: &str, error: StorageError) {
        self.always_fail
            .lock()
            .unwrap()
            .insert(key.to_string(), error);
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn attempts(&self, key: &str) -> u32 {
        self.attempts.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    /// Highest number of uploads observed in flight at once.
    pub fn peak_uploads(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Highest number of archives observed uploading at once.
    ///
    /// The archive of a key is its first path component.
    pub fn peak_archives(&self) -> usize {
        self.peak_archives.load(Ordering::SeqCst)
    }

    fn enter(&self, key: &str) -> ActiveUpload<'_> {
        let now: usize = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let archive: String = key.split('/').next().unwrap_or_default().to_string();
        let mut archives = self.active_archives.lock().unwrap();
        *archives.entry(archive.clone()).or_insert(0) += 1;
        self.peak_archives.fetch_max(archives.len(), Ordering::SeqCst);

        ActiveUpload {
            store: self,
            archive,
        }
    }

    fn scripted_failure(&self, key: &str) -> Option<StorageError> {
        if let Some(error) = self.always_fail.lock().unwrap().get(key) {
            return Some(error.clone());
        }
        self.failures
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl ObjectStore for TestObjectStore {
    async fn upload_object(
        &self,
        mut body: ByteStream,
        key: &str,
        size: Option<u64>,
        metadata: &MetadataMap,
        content_type: &str,
    ) -> Result<(), StorageError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert(0) += 1;
        let _active: ActiveUpload<'_> = self.enter(key);

        let delay: Option<Duration> = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.scripted_failure(key) {
            return Err(error);
        }

        let mut data: Vec<u8> = Vec::new();
        body.read_to_end(&mut data).await?;
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                size,
                metadata: metadata.clone(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool, StorageError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.existing.lock().unwrap().contains(key)
            || self.objects.lock().unwrap().contains_key(key))
    }

    fn describe(&self) -> String {
        "memory://test".to_string()
    }
}

/// Archive served from memory.
#[derive(Default)]
pub struct TestSource {
    archive_id: String,
    files: BTreeMap<String, Vec<u8>>,
    metadata: HashMap<String, MetadataMap>,
    open_failures: Mutex<HashMap<String, VecDeque<SourceError>>>,
    panic_on_open: Option<String>,
    panic_on_list: bool,
    list_error: bool,
    opens: Mutex<HashMap<String, u32>>,
}

impl TestSource {
    pub fn new(archive_id: &str) -> Self {
        Self {
            archive_id: archive_id.to_string(),
            ..Self::default()
        }
    }

    /// Archive with `count` files named `{prefix}{i}.jpg`.
    pub fn with_files(archive_id: &str, prefix: &str, count: usize) -> Self {
        let mut source: TestSource = Self::new(archive_id);
        for i in 0..count {
            source = source.with_file(&format!("{}{}.jpg", prefix, i), format!("data-{}", i).as_bytes());
        }
        source
    }

    pub fn with_file(mut self, path: &str, data: &[u8]) -> Self {
        self.files.insert(path.to_string(), data.to_vec());
        self
    }

    pub fn with_metadata(mut self, path: &str, metadata: MetadataMap) -> Self {
        self.metadata.insert(path.to_string(), metadata);
        self
    }

    pub fn with_open_failures(self, path: &str, errors: Vec<SourceError>) -> Self {
        self.open_failures
            .lock()
            .unwrap()
            .insert(path.to_string(), errors.into());
        self
    }

    pub fn panicking_on_open(mut self, path: &str) -> Self {
        self.panic_on_open = Some(path.to_string());
        self
    }

    pub fn panicking_on_list(mut self) -> Self {
        self.panic_on_list = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.list_error = true;
        self
    }

    pub fn opens(&self, path: &str) -> u32 {
        self.opens.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SourceReader for TestSource {
    fn archive_id(&self) -> &str {
        &self.archive_id
    }

    async fn list_files(&self) -> Result<Vec<MediaFile>, SourceError> {
        if self.panic_on_list {
            panic!("listing exploded");
        }
        if self.list_error {
            return Err(SourceError::NotFound {
                path: self.archive_id.clone(),
            });
        }
        Ok(self
            .files
            .iter()
            .map(|(path, data)| {
                MediaFile::new(path.clone(), self.archive_id.clone()).with_size(data.len() as u64)
            })
            .collect())
    }

    async fn open_file(&self, path: &str) -> Result<ByteStream, SourceError> {
        *self.opens.lock().unwrap().entry(path.to_string()).or_insert(0) += 1;
        if self.panic_on_open.as_deref() == Some(path) {
            panic!("open exploded for {}", path);
        }
        let scripted: Option<SourceError> = self
            .open_failures
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }
        match self.files.get(path) {
            Some(data) => Ok(byte_stream(std::io::Cursor::new(data.clone()))),
            None => Err(SourceError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    async fn get_metadata(&self, path: &str) -> Option<MetadataMap> {
        self.metadata.get(path).cloned()
    }

    async fn get_size(&self, path: &str) -> Option<u64> {
        self.files.get(path).map(|data| data.len() as u64)
    }
}

/// Opener handing out prepared sources by archive path, then by archive name.
#[derive(Default)]
pub struct TestOpener {
    sources: Mutex<HashMap<String, Arc<TestSource>>>,
    located: Mutex<HashMap<PathBuf, Arc<TestSource>>>,
}

impl TestOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(self, source: TestSource) -> Self {
        let name: String = source.archive_id.clone();
        self.sources.lock().unwrap().insert(name, Arc::new(source));
        self
    }

    /// Serve `source` for the archive at `path`, whatever its name.
    pub fn with_source_at(self, path: &str, source: TestSource) -> Self {
        self.located
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), Arc::new(source));
        self
    }
}

#[async_trait]
impl SourceOpener for TestOpener {
    async fn open(&self, archive: &ArchiveInput) -> Result<Arc<dyn SourceReader>, SourceError> {
        let located: Option<Arc<TestSource>> = self.located.lock().unwrap().get(&archive.path).cloned();
        let source: Option<Arc<TestSource>> =
            located.or_else(|| self.sources.lock().unwrap().get(&archive.name).cloned());
        match source {
            Some(source) => Ok(source),
            None => Err(SourceError::UnsupportedArchive {
                path: archive.path.display().to_string(),
                reason: "no test source".into(),
            }),
        }
    }
}

/// Directory archive input pointing nowhere; only the name matters to [`TestOpener`].
pub fn archive_input(name: &str) -> ArchiveInput {
    ArchiveInput {
        name: name.to_string(),
        path: PathBuf::from(format!("/archives/{}", name)),
        kind: media_relay_filesystem::ArchiveKind::Directory,
    }
}

/// Directory archive input named `name` located at `path`.
pub fn archive_at(name: &str, path: &str) -> ArchiveInput {
    ArchiveInput {
        name: name.to_string(),
        path: PathBuf::from(path),
        kind: media_relay_filesystem::ArchiveKind::Directory,
    }
}
