//! Error types for object store operations.

use thiserror::Error;

use crate::classify::{Classify, ErrorClass};

/// Errors that can occur during object store operations.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Object or bucket not found.
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Credentials rejected or access denied.
    #[error("Access denied to s3://{bucket}/{key}: {message}")]
    AccessDenied {
        bucket: String,
        key: String,
        message: String,
    },

    /// Error response from the service, carrying its error code.
    #[error("Service error {code}: {message}")]
    Service { code: String, message: String },

    /// Transport failure (dispatch, timeout, broken connection).
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Local I/O error while reading the source stream.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// Operation cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl Classify for StorageError {
    fn error_class(&self) -> Option<ErrorClass> {
        match self {
            StorageError::NotFound { .. } => Some(ErrorClass::Terminal),
            StorageError::AccessDenied { .. } => Some(ErrorClass::Terminal),
            StorageError::InvalidConfig { .. } => Some(ErrorClass::Terminal),
            StorageError::Cancelled => Some(ErrorClass::Cancelled),
            StorageError::NetworkError { retryable: true, .. } => Some(ErrorClass::Transient),
            StorageError::NetworkError { retryable: false, .. } => Some(ErrorClass::Terminal),
            // Classified by code / message table.
            StorageError::Service { .. } => None,
            StorageError::IoError { .. } => None,
            StorageError::Other { .. } => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError {
            path: String::new(),
            message: err.to_string(),
        }
    }
}
