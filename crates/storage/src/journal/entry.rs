//! On-disk journal document.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Completion record for one archive-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub path: String,
    pub uploaded: bool,
    pub timestamp: DateTime<Utc>,
    /// Archive the file was uploaded from.
    #[serde(rename = "archive", default)]
    pub archive_id: String,
}

impl JournalEntry {
    /// A record marking `path` as uploaded now.
    pub fn uploaded(path: &str, archive_id: &str) -> Self {
        Self {
            path: path.to_string(),
            uploaded: true,
            timestamp: Utc::now(),
            archive_id: archive_id.to_string(),
        }
    }
}

/// Document as read from disk. `uploads` may be `null` in older files.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct JournalDocument {
    #[serde(default)]
    pub uploads: Option<HashMap<String, JournalEntry>>,
}

/// Borrowed view written to disk, ordered by path.
#[derive(Debug, Serialize)]
pub(crate) struct JournalDocumentRef<'a> {
    pub uploads: BTreeMap<&'a str, &'a JournalEntry>,
}
