//! Storage-side building blocks for media-relay.
//!
//! - **Object store** - the [`ObjectStore`] trait implemented by each backend
//! - **Retry** - [`RetryPolicy`] with exponential backoff, jitter, and error
//!   classification
//! - **Journal** - the durable record of uploaded paths used for resume
//! - **Content types** - extension table and metadata override

mod classify;
pub mod content_type;
mod error;
pub mod journal;
mod retry;
mod traits;
mod types;

pub use classify::{
    Classify, ErrorClass, ErrorClassifier, DEFAULT_RETRYABLE_CODES, DEFAULT_TRANSIENT_PATTERNS,
};
pub use content_type::{content_type_for, is_media_file, resolve_content_type};
pub use error::StorageError;
pub use journal::{Journal, JournalEntry, JournalError, JournalStats, PeriodicSave};
pub use retry::{RetryError, RetryPolicy, BACKOFF_JITTER};
pub use traits::ObjectStore;
pub use types::{JournalSettings, RetrySettings};
