//! The archive reader interface consumed by the upload driver.

use std::sync::Arc;

use async_trait::async_trait;
use media_relay_common::{ByteStream, MetadataMap};

use crate::discover::ArchiveInput;
use crate::error::SourceError;

/// One uploadable file inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Archive-relative POSIX path; unique within the archive.
    pub path: String,
    /// Size in bytes when known from the listing.
    pub size: Option<u64>,
    /// Archive the file belongs to.
    pub archive_id: String,
    /// Exported metadata, if any was found while listing.
    pub metadata: Option<MetadataMap>,
}

impl MediaFile {
    pub fn new(path: impl Into<String>, archive_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
            archive_id: archive_id.into(),
            metadata: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Read access to one archive.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Name the archive is journaled and reported under.
    fn archive_id(&self) -> &str;

    /// Every uploadable file in the archive. Called once per run.
    async fn list_files(&self) -> Result<Vec<MediaFile>, SourceError>;

    /// Open a file for reading.
    ///
    /// # Errors
    /// [`SourceError::NotFound`] if the file is gone, [`SourceError::Io`] otherwise.
    async fn open_file(&self, path: &str) -> Result<ByteStream, SourceError>;

    /// Exported metadata for a file, if any.
    async fn get_metadata(&self, path: &str) -> Option<MetadataMap>;

    /// Size of a file, if known without opening it.
    async fn get_size(&self, path: &str) -> Option<u64>;
}

/// Opens the archives found by [`discover_archives`](crate::discover_archives).
#[async_trait]
pub trait SourceOpener: Send + Sync {
    /// Open one archive for reading.
    ///
    /// # Errors
    /// Returns error if the archive cannot be read or its format is unsupported.
    async fn open(&self, archive: &ArchiveInput) -> Result<Arc<dyn SourceReader>, SourceError>;
}
