//! Archive sources for media-relay.
//!
//! - [`SourceReader`] - read access to one archive, consumed by the upload driver
//! - [`DirectorySource`] - reader for an extracted archive directory
//! - [`ZipSource`] - reader for a `.zip` archive, streamed without extracting it
//! - [`ArchiveOpener`] - picks the reader for each discovered archive
//! - [`MediaFilter`] - media-type and include/exclude glob selection
//! - [`Sidecar`] - `<file>.json` metadata flattened into object metadata
//! - [`discover_archives`] - expansion of inputs into the archives to upload

pub mod directory;
pub mod discover;
pub mod error;
pub mod filter;
pub mod opener;
pub mod sidecar;
pub mod source;
pub mod zipfile;

pub use directory::DirectorySource;
pub use discover::{discover_archives, ArchiveInput, ArchiveKind};
pub use error::SourceError;
pub use filter::{escape_glob, MediaFilter};
pub use opener::ArchiveOpener;
pub use sidecar::{is_sidecar_path, Sidecar};
pub use source::{MediaFile, SourceOpener, SourceReader};
pub use zipfile::ZipSource;
