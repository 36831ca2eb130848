//! Opens discovered archives with the reader matching their kind.

use std::sync::Arc;

use async_trait::async_trait;

use crate::directory::DirectorySource;
use crate::discover::{ArchiveInput, ArchiveKind};
use crate::error::SourceError;
use crate::filter::MediaFilter;
use crate::source::{SourceOpener, SourceReader};
use crate::zipfile::ZipSource;

/// Opens directory archives as [`DirectorySource`] and zip archives as [`ZipSource`].
#[derive(Debug, Clone, Default)]
pub struct ArchiveOpener {
    filter: MediaFilter,
}

impl ArchiveOpener {
    pub fn new(filter: MediaFilter) -> Self {
        Self { filter }
    }
}

#[async_trait]
impl SourceOpener for ArchiveOpener {
    async fn open(&self, archive: &ArchiveInput) -> Result<Arc<dyn SourceReader>, SourceError> {
        let filter: MediaFilter = self.filter.clone();
        match archive.kind {
            ArchiveKind::Directory => {
                let source: DirectorySource =
                    DirectorySource::open_as(&archive.path, &archive.name, filter).await?;
                Ok(Arc::new(source))
            }
            ArchiveKind::Zip => {
                let source: ZipSource = ZipSource::open_as(&archive.path, &archive.name, filter).await?;
                Ok(Arc::new(source))
            }
        }
    }
}
