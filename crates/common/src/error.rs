//! Shared error types used across media-relay crates.

use thiserror::Error;

/// Path-related errors shared across crates.
#[derive(Debug, Error, Clone)]
pub enum PathError {
    /// Path is outside the archive root it was listed under.
    #[error("Path is outside root: {path} not in {root}")]
    PathOutsideRoot {
        /// The path that was checked.
        path: String,
        /// The archive root it should be within.
        root: String,
    },

    /// Path is not valid UTF-8 and cannot be used as an object key.
    #[error("Path is not valid UTF-8: {path}")]
    NonUtf8 {
        /// Lossy rendering of the path.
        path: String,
    },

    /// No home directory could be determined for the default journal.
    #[error("Cannot determine home directory")]
    NoHomeDirectory,
}
