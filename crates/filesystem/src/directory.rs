//! Archive reader for an extracted archive directory.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use media_relay_common::{archive_name, byte_stream, relative_posix_path, ByteStream, MetadataMap};
use tokio::io::BufReader;
use walkdir::{DirEntry, WalkDir};

use crate::error::SourceError;
use crate::filter::MediaFilter;
use crate::sidecar::{sidecar_path_for, Sidecar};
use crate::source::{MediaFile, SourceReader};

/// An archive that has been extracted to a local directory.
///
/// The directory is walked once when the source is opened; the listing,
/// sizes, and side-car metadata are served from that index afterwards.
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
    archive_id: String,
    files: HashMap<String, MediaFile>,
}

impl DirectorySource {
    /// Walk `root` and index the files selected by `filter`.
    ///
    /// # Arguments
    /// * `root` - Archive root directory
    /// * `filter` - File selection rules
    ///
    /// # Errors
    /// Returns error if `root` is not a readable directory.
    pub async fn open(root: impl Into<PathBuf>, filter: MediaFilter) -> Result<Self, SourceError> {
        let root: PathBuf = root.into();
        let archive_id: String = archive_name(&root);
        Self::open_as(root, archive_id, filter).await
    }

    /// Like [`DirectorySource::open`] with an explicit archive name.
    pub async fn open_as(
        root: impl Into<PathBuf>,
        archive_id: impl Into<String>,
        filter: MediaFilter,
    ) -> Result<Self, SourceError> {
        let root: PathBuf = root.into();
        let archive_id: String = archive_id.into();

        let metadata: std::fs::Metadata = tokio::fs::metadata(&root)
            .await
            .map_err(|e| SourceError::io(root.display().to_string(), e))?;
        if !metadata.is_dir() {
            return Err(SourceError::UnsupportedArchive {
                path: root.display().to_string(),
                reason: "not a directory".into(),
            });
        }

        let walk_root: PathBuf = root.clone();
        let walk_id: String = archive_id.clone();
        let files: HashMap<String, MediaFile> =
            tokio::task::spawn_blocking(move || index_directory(&walk_root, &walk_id, &filter))
                .await
                .map_err(|e| SourceError::Io {
                    path: root.display().to_string(),
                    source: std::io::Error::other(e.to_string()),
                })??;

        tracing::info!(
            archive = %archive_id,
            root = %root.display(),
            files = files.len(),
            "Indexed archive directory"
        );

        Ok(Self {
            root,
            archive_id,
            files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an archive-relative path to a location under the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, SourceError> {
        let relative: &Path = Path::new(path);
        let escapes: bool = relative
            .components()
            .any(|c: Component| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SourceError::NotFound {
                path: path.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

fn index_directory(
    root: &Path,
    archive_id: &str,
    filter: &MediaFilter,
) -> Result<HashMap<String, MediaFile>, SourceError> {
    let mut files: HashMap<String, MediaFile> = HashMap::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry: DirEntry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Unreadable subtrees are skipped; an unreadable root is not.
                if e.depth() == 0 {
                    let path: String = root.display().to_string();
                    return Err(match e.into_io_error() {
                        Some(io) => SourceError::io(path, io),
                        None => SourceError::UnsupportedArchive {
                            path,
                            reason: "directory walk failed".into(),
                        },
                    });
                }
                tracing::warn!(archive = %archive_id, "Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let relative: String = match relative_posix_path(entry.path(), root) {
            Ok(relative) => relative,
            Err(e) => {
                tracing::warn!(archive = %archive_id, "Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };

        if !filter.matches(&relative) {
            continue;
        }

        let mut file: MediaFile = MediaFile::new(relative.clone(), archive_id);
        match entry.metadata() {
            Ok(meta) => file = file.with_size(meta.len()),
            Err(e) => tracing::warn!(archive = %archive_id, path = %relative, "Failed to stat file: {}", e),
        }

        if let Some(metadata) = read_sidecar(entry.path(), archive_id, &relative) {
            file = file.with_metadata(metadata);
        }

        files.insert(relative, file);
    }

    Ok(files)
}

fn read_sidecar(file_path: &Path, archive_id: &str, relative: &str) -> Option<MetadataMap> {
    let sidecar_path: PathBuf = PathBuf::from(sidecar_path_for(&file_path.to_string_lossy()));
    let bytes: Vec<u8> = match std::fs::read(&sidecar_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(archive = %archive_id, path = %relative, "Failed to read side-car metadata: {}", e);
            return None;
        }
    };

    let file_name: String = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match Sidecar::parse(&bytes) {
        Ok(sidecar) => Some(sidecar.to_metadata(&file_name)),
        Err(e) => {
            tracing::warn!(archive = %archive_id, path = %relative, "Invalid side-car metadata: {}", e);
            None
        }
    }
}

#[async_trait]
impl SourceReader for DirectorySource {
    fn archive_id(&self) -> &str {
        &self.archive_id
    }

    async fn list_files(&self) -> Result<Vec<MediaFile>, SourceError> {
        let mut files: Vec<MediaFile> = self.files.values().cloned().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn open_file(&self, path: &str) -> Result<ByteStream, SourceError> {
        let full_path: PathBuf = self.resolve(path)?;
        let file: tokio::fs::File = tokio::fs::File::open(&full_path)
            .await
            .map_err(|e| SourceError::io(path, e))?;
        Ok(byte_stream(BufReader::new(file)))
    }

    async fn get_metadata(&self, path: &str) -> Option<MetadataMap> {
        self.files.get(path).and_then(|f| f.metadata.clone())
    }

    async fn get_size(&self, path: &str) -> Option<u64> {
        if let Some(size) = self.files.get(path).and_then(|f| f.size) {
            return Some(size);
        }
        let full_path: PathBuf = self.resolve(path).ok()?;
        tokio::fs::metadata(&full_path).await.ok().map(|m| m.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn write(root: &Path, relative: &str, content: &[u8]) {
        let path: PathBuf = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_lists_media_files_with_sidecars() {
        let dir: TempDir = TempDir::new().unwrap();
        let root: PathBuf = dir.path().join("takeout-001");
        write(&root, "Photos/b.jpg", b"bbbb");
        write(&root, "Photos/a.jpg", b"aa");
        write(&root, "Photos/a.jpg.json", br#"{"description": "first"}"#);
        write(&root, "archive_browser.html", b"<html/>");

        let source: DirectorySource = DirectorySource::open(&root, MediaFilter::new())
            .await
            .unwrap();
        assert_eq!(source.archive_id(), "takeout-001");

        let files: Vec<MediaFile> = source.list_files().await.unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["Photos/a.jpg", "Photos/b.jpg"]);
        assert_eq!(files[0].size, Some(2));

        let metadata: MetadataMap = source.get_metadata("Photos/a.jpg").await.unwrap();
        assert_eq!(metadata["description"], "first");
        assert_eq!(metadata["title"], "a.jpg");
        assert!(source.get_metadata("Photos/b.jpg").await.is_none());
        assert_eq!(source.get_size("Photos/b.jpg").await, Some(4));
    }

    #[tokio::test]
    async fn test_open_file_reads_content() {
        let dir: TempDir = TempDir::new().unwrap();
        write(dir.path(), "x/clip.mov", b"movie-bytes");

        let source: DirectorySource = DirectorySource::open(dir.path(), MediaFilter::new())
            .await
            .unwrap();
        let mut stream: ByteStream = source.open_file("x/clip.mov").await.unwrap();
        let mut content: Vec<u8> = Vec::new();
        stream.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"movie-bytes");
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let dir: TempDir = TempDir::new().unwrap();
        let source: DirectorySource = DirectorySource::open(dir.path(), MediaFilter::new())
            .await
            .unwrap();
        assert!(matches!(
            source.open_file("gone.jpg").await,
            Err(SourceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_escaping_paths() {
        let dir: TempDir = TempDir::new().unwrap();
        let source: DirectorySource = DirectorySource::open(dir.path(), MediaFilter::new())
            .await
            .unwrap();
        assert!(source.open_file("../secret.jpg").await.is_err());
        assert!(source.open_file("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_root_fails() {
        let dir: TempDir = TempDir::new().unwrap();
        let result = DirectorySource::open(dir.path().join("nope"), MediaFilter::new()).await;
        assert!(matches!(result, Err(SourceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_file_root_is_unsupported() {
        let dir: TempDir = TempDir::new().unwrap();
        write(dir.path(), "takeout.tgz", b"x");
        let result =
            DirectorySource::open(dir.path().join("takeout.tgz"), MediaFilter::new()).await;
        assert!(matches!(
            result,
            Err(SourceError::UnsupportedArchive { .. })
        ));
    }
}
