//! Byte stream and metadata types exchanged between readers and stores.

use std::collections::BTreeMap;
use std::pin::Pin;

use tokio::io::AsyncRead;

/// Readable body of one file, handed from an archive reader to an object store.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Open, versionless metadata export: string keys to string values.
pub type MetadataMap = BTreeMap<String, String>;

/// Box any async reader into a `ByteStream`.
pub fn byte_stream<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Send + 'static,
{
    Box::pin(reader)
}
