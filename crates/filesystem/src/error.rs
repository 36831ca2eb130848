//! Error types for archive sources.

use std::io::ErrorKind;

use media_relay_common::PathError;
use media_relay_storage::{Classify, ErrorClass};
use thiserror::Error;

/// Errors that can occur while discovering or reading archives.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("I/O error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlobPattern { pattern: String, reason: String },

    #[error("Unsupported archive {path}: {reason}")]
    UnsupportedArchive { path: String, reason: String },

    #[error("Input does not exist: {path}")]
    InputNotFound { path: String },

    #[error("Listing cancelled")]
    Cancelled,
}

impl SourceError {
    /// Wrap an I/O error, mapping `NotFound` to [`SourceError::NotFound`].
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path: String = path.into();
        if source.kind() == ErrorKind::NotFound {
            SourceError::NotFound { path }
        } else {
            SourceError::Io { path, source }
        }
    }
}

impl Classify for SourceError {
    fn error_class(&self) -> Option<ErrorClass> {
        match self {
            SourceError::Io { source, .. } => match source.kind() {
                ErrorKind::Interrupted
                | ErrorKind::TimedOut
                | ErrorKind::WouldBlock
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted => Some(ErrorClass::Transient),
                ErrorKind::PermissionDenied | ErrorKind::InvalidInput | ErrorKind::InvalidData => {
                    Some(ErrorClass::Terminal)
                }
                _ => None,
            },
            SourceError::Cancelled => Some(ErrorClass::Cancelled),
            _ => Some(ErrorClass::Terminal),
        }
    }
}
