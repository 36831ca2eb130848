//! Object store interface used by the upload driver.

use async_trait::async_trait;
use media_relay_common::{ByteStream, MetadataMap};

use crate::error::StorageError;

/// Remote object store operations - implemented by each backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a stream as one object.
    ///
    /// # Arguments
    /// * `body` - Object content; consumed by the call
    /// * `key` - Destination object key
    /// * `size` - Content length when known up front
    /// * `metadata` - User metadata attached to the object
    /// * `content_type` - MIME type of the object
    async fn upload_object(
        &self,
        body: ByteStream,
        key: &str,
        size: Option<u64>,
        metadata: &MetadataMap,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Check whether an object exists. A missing object is `Ok(false)`, not an error.
    async fn object_exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Human-readable destination (endpoint and bucket) for log lines.
    fn describe(&self) -> String;
}
