//! Archive reader for a zip file, read in place without extracting it.
//!
//! The central directory is indexed once when the source is opened. Each
//! opened file is decompressed on a blocking thread and handed back in
//! chunks, so a large video is never held in memory.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use media_relay_common::{archive_name, byte_stream, to_posix_path, ByteStream, MetadataMap};
use tokio::sync::{mpsc, oneshot};
use tokio_util::io::StreamReader;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::SourceError;
use crate::filter::MediaFilter;
use crate::sidecar::{sidecar_path_for, Sidecar};
use crate::source::{MediaFile, SourceReader};

/// Decompressed bytes per chunk sent to the reader.
const CHUNK_SIZE: usize = 256 * 1024;

/// Chunks buffered between the decompressing thread and the reader.
const CHUNKS_IN_FLIGHT: usize = 4;

type Chunk = Result<Bytes, std::io::Error>;

/// Listing plus the zip entry name behind each listed path.
type ZipIndex = (HashMap<String, MediaFile>, HashMap<String, String>);

/// An archive that is still a `.zip` file.
#[derive(Debug)]
pub struct ZipSource {
    path: PathBuf,
    archive_id: String,
    files: HashMap<String, MediaFile>,
    /// Listed path to the entry name inside the zip.
    entries: HashMap<String, String>,
}

impl ZipSource {
    /// Index the entries of the zip at `path` selected by `filter`.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a zip archive.
    pub async fn open(path: impl Into<PathBuf>, filter: MediaFilter) -> Result<Self, SourceError> {
        let path: PathBuf = path.into();
        let archive_id: String = archive_name(&path);
        Self::open_as(path, archive_id, filter).await
    }

    /// Like [`ZipSource::open`] with an explicit archive name.
    pub async fn open_as(
        path: impl Into<PathBuf>,
        archive_id: impl Into<String>,
        filter: MediaFilter,
    ) -> Result<Self, SourceError> {
        let path: PathBuf = path.into();
        let archive_id: String = archive_id.into();

        let index_path: PathBuf = path.clone();
        let index_id: String = archive_id.clone();
        let (files, entries): ZipIndex =
            tokio::task::spawn_blocking(move || index_zip(&index_path, &index_id, &filter))
                .await
                .map_err(|e| SourceError::Io {
                    path: path.display().to_string(),
                    source: std::io::Error::other(e.to_string()),
                })??;

        tracing::info!(
            archive = %archive_id,
            zip = %path.display(),
            files = files.len(),
            "Indexed zip archive"
        );

        Ok(Self {
            path,
            archive_id,
            files,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn zip_error(path: impl Into<String>, err: ZipError) -> SourceError {
    let path: String = path.into();
    match err {
        ZipError::Io(e) => SourceError::io(path, e),
        ZipError::FileNotFound => SourceError::NotFound { path },
        other => SourceError::UnsupportedArchive {
            path,
            reason: other.to_string(),
        },
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>, SourceError> {
    let file: File = File::open(path).map_err(|e| SourceError::io(path.display().to_string(), e))?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| zip_error(path.display().to_string(), e))
}

fn index_zip(path: &Path, archive_id: &str, filter: &MediaFilter) -> Result<ZipIndex, SourceError> {
    let mut archive: ZipArchive<BufReader<File>> = open_archive(path)?;
    let names: HashSet<String> = archive.file_names().map(str::to_string).collect();

    let mut selected: Vec<(String, String, u64)> = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| zip_error(path.display().to_string(), e))?;
        if entry.is_dir() {
            continue;
        }

        let relative: String = match entry.enclosed_name() {
            Some(name) => to_posix_path(&name),
            None => {
                tracing::warn!(archive = %archive_id, entry = %entry.name(), "Skipping entry with an unsafe path");
                continue;
            }
        };
        if relative.is_empty() || !filter.matches(&relative) {
            continue;
        }
        selected.push((relative, entry.name().to_string(), entry.size()));
    }

    let mut files: HashMap<String, MediaFile> = HashMap::new();
    let mut entries: HashMap<String, String> = HashMap::new();
    for (relative, entry_name, size) in selected {
        let mut file: MediaFile = MediaFile::new(relative.clone(), archive_id).with_size(size);

        let sidecar_name: String = sidecar_path_for(&entry_name);
        if names.contains(&sidecar_name) {
            if let Some(metadata) = read_sidecar(&mut archive, &sidecar_name, archive_id, &relative) {
                file = file.with_metadata(metadata);
            }
        }

        entries.insert(relative.clone(), entry_name);
        files.insert(relative, file);
    }

    Ok((files, entries))
}

fn read_sidecar<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    sidecar_name: &str,
    archive_id: &str,
    relative: &str,
) -> Option<MetadataMap> {
    let mut bytes: Vec<u8> = Vec::new();
    let read: Result<usize, String> = archive
        .by_name(sidecar_name)
        .map_err(|e| e.to_string())
        .and_then(|mut entry| entry.read_to_end(&mut bytes).map_err(|e| e.to_string()));
    if let Err(e) = read {
        tracing::warn!(archive = %archive_id, path = %relative, "Failed to read side-car metadata: {}", e);
        return None;
    }

    let file_name: &str = relative.rsplit('/').next().unwrap_or(relative);
    match Sidecar::parse(&bytes) {
        Ok(sidecar) => Some(sidecar.to_metadata(file_name)),
        Err(e) => {
            tracing::warn!(archive = %archive_id, path = %relative, "Invalid side-car metadata: {}", e);
            None
        }
    }
}

/// Decompress one entry into `chunks`.
///
/// `ready` resolves once the entry is open, so open errors reach the caller of
/// `open_file` and read errors reach the stream. Stops early when the reader
/// is dropped.
fn stream_entry(
    zip_path: &Path,
    entry_name: &str,
    ready: oneshot::Sender<Result<(), SourceError>>,
    chunks: mpsc::Sender<Chunk>,
) {
    let mut archive: ZipArchive<BufReader<File>> = match open_archive(zip_path) {
        Ok(archive) => archive,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let mut entry = match archive.by_name(entry_name) {
        Ok(entry) => entry,
        Err(e) => {
            let _ = ready.send(Err(zip_error(entry_name, e)));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    let mut buf: Vec<u8> = vec![0u8; CHUNK_SIZE];
    loop {
        let chunk: Chunk = match entry.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => Err(e),
        };
        let failed: bool = chunk.is_err();
        if chunks.blocking_send(chunk).is_err() || failed {
            return;
        }
    }
}

#[async_trait]
impl SourceReader for ZipSource {
    fn archive_id(&self) -> &str {
        &self.archive_id
    }

    async fn list_files(&self) -> Result<Vec<MediaFile>, SourceError> {
        let mut files: Vec<MediaFile> = self.files.values().cloned().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn open_file(&self, path: &str) -> Result<ByteStream, SourceError> {
        let entry_name: String = match self.entries.get(path) {
            Some(name) => name.clone(),
            None => {
                return Err(SourceError::NotFound {
                    path: path.to_string(),
                })
            }
        };

        let zip_path: PathBuf = self.path.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), SourceError>>();
        let (chunk_tx, chunk_rx) = mpsc::channel::<Chunk>(CHUNKS_IN_FLIGHT);
        tokio::task::spawn_blocking(move || stream_entry(&zip_path, &entry_name, ready_tx, chunk_tx));

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(SourceError::Io {
                    path: path.to_string(),
                    source: std::io::Error::other("zip reader stopped before the entry was opened"),
                })
            }
        }

        let stream = futures::stream::unfold(chunk_rx, |mut rx: mpsc::Receiver<Chunk>| async move {
            rx.recv().await.map(|chunk: Chunk| (chunk, rx))
        });
        Ok(byte_stream(StreamReader::new(stream)))
    }

    async fn get_metadata(&self, path: &str) -> Option<MetadataMap> {
        self.files.get(path).and_then(|f| f.metadata.clone())
    }

    async fn get_size(&self, path: &str) -> Option<u64> {
        self.files.get(path).and_then(|f| f.size)
    }
}
