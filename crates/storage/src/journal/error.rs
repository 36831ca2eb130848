//! Journal persistence errors.

use thiserror::Error;

/// Errors that can occur while loading or saving a journal.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Failed to read journal {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Journal {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode journal {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write journal {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
