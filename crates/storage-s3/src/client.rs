//! AWS SDK S3 object store implementation.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream as SdkByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use tokio::io::AsyncReadExt;

use media_relay_common::{
    object_key, ByteStream, MetadataMap, MULTIPART_PART_SIZE, MULTIPART_THRESHOLD,
};
use media_relay_storage::content_type::CONTENT_TYPE_METADATA_KEY;
use media_relay_storage::{ObjectStore, StorageError};

use crate::error::map_sdk_error;
use crate::settings::S3Settings;

/// ObjectStore implementation using the AWS SDK for Rust.
///
/// Objects up to [`MULTIPART_THRESHOLD`] bytes are sent with a single `PutObject`.
/// Larger objects, and streams of unknown length, are streamed as a multipart
/// upload that is aborted if any part fails.
pub struct S3ObjectStore {
    /// The underlying S3 client.
    s3_client: S3Client,
    bucket: String,
    prefix: String,
    endpoint: String,
}

impl S3ObjectStore {
    /// Build a client and verify the bucket is reachable.
    ///
    /// # Arguments
    /// * `settings` - Endpoint, region, bucket and optional static credentials
    ///
    /// # Errors
    /// Returns error if the bucket name is empty, the bucket does not exist, or
    /// the credentials are rejected.
    pub async fn connect(settings: S3Settings) -> Result<Self, StorageError> {
        let store: Self = Self::new(settings).await?;
        store.verify_bucket().await?;
        Ok(store)
    }

    /// Build a client without contacting the service.
    ///
    /// # Errors
    /// Returns error if the bucket name is empty.
    pub async fn new(settings: S3Settings) -> Result<Self, StorageError> {
        if settings.bucket.trim().is_empty() {
            return Err(StorageError::InvalidConfig {
                message: "bucket name is required".into(),
            });
        }

        let config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.region.clone()));

        let config_loader = if let Some((access_key, secret_key)) = settings.static_credentials() {
            let credentials: Credentials = Credentials::new(
                access_key,
                secret_key,
                settings.session_token.clone(),
                None,
                "media-relay",
            );
            config_loader.credentials_provider(credentials)
        } else {
            config_loader
        };

        let sdk_config = config_loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        let endpoint_url: Option<String> = settings.endpoint_url();
        if let Some(ref url) = endpoint_url {
            builder = builder
                .endpoint_url(url)
                .force_path_style(settings.force_path_style);
        }

        let endpoint: String =
            endpoint_url.unwrap_or_else(|| format!("s3.{}.amazonaws.com", settings.region));

        Ok(Self::from_client(
            S3Client::from_conf(builder.build()),
            settings.bucket,
            settings.prefix,
            endpoint,
        ))
    }

    /// Create a store from an existing S3Client (for testing).
    pub fn from_client(
        s3_client: S3Client,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            s3_client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            endpoint: endpoint.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Check that the bucket exists and the credentials can reach it.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] for a missing bucket and
    /// [`StorageError::AccessDenied`] for rejected credentials.
    pub async fn verify_bucket(&self) -> Result<(), StorageError> {
        self.s3_client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, &self.bucket, ""))?;

        tracing::info!(bucket = %self.bucket, endpoint = %self.endpoint, "Bucket is reachable");
        Ok(())
    }

    fn full_key(&self, key: &str) -> String {
        object_key(&self.prefix, key)
    }

    async fn put_single(
        &self,
        key: &str,
        data: Vec<u8>,
        metadata: &MetadataMap,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let length: i64 = data.len() as i64;
        let mut request = self
            .s3_client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(length)
            .content_type(content_type)
            .body(SdkByteStream::from(data));

        for (k, v) in object_metadata(metadata) {
            request = request.metadata(k, v);
        }

        request
            .send()
            .await
            .map_err(|err| map_sdk_error(err, &self.bucket, key))?;

        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        first_part: Vec<u8>,
        body: &mut ByteStream,
        metadata: &MetadataMap,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let mut request = self
            .s3_client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type);

        for (k, v) in object_metadata(metadata) {
            request = request.metadata(k, v);
        }

        let created = request
            .send()
            .await
            .map_err(|err| map_sdk_error(err, &self.bucket, key))?;
        let upload_id: String = created.upload_id().unwrap_or_default().to_string();
        if upload_id.is_empty() {
            return Err(StorageError::Other {
                message: format!("no upload id returned for {}", key),
            });
        }

        match self.upload_parts(key, &upload_id, first_part, body).await {
            Ok(parts) => {
                self.s3_client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|err| map_sdk_error(err, &self.bucket, key))?;
                Ok(())
            }
            Err(e) => {
                let aborted = self
                    .s3_client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await;
                if let Err(abort_err) = aborted {
                    tracing::warn!(
                        key,
                        upload_id = %upload_id,
                        "Failed to abort multipart upload: {}",
                        map_sdk_error(abort_err, &self.bucket, key)
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first_part: Vec<u8>,
        body: &mut ByteStream,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let mut parts: Vec<CompletedPart> = Vec::new();
        let mut part_number: i32 = 1;
        let mut chunk: Vec<u8> = first_part;

        loop {
            let length: i64 = chunk.len() as i64;
            let output = self
                .s3_client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_length(length)
                .body(SdkByteStream::from(chunk))
                .send()
                .await
                .map_err(|err| map_sdk_error(err, &self.bucket, key))?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .build(),
            );
            tracing::trace!(key, part_number, bytes = length, "Uploaded part");

            chunk = read_chunk(body, MULTIPART_PART_SIZE, key).await?;
            if chunk.is_empty() {
                return Ok(parts);
            }
            part_number += 1;
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload_object(
        &self,
        mut body: ByteStream,
        key: &str,
        size: Option<u64>,
        metadata: &MetadataMap,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let key: String = self.full_key(key);

        if let Some(size) = size.filter(|s: &u64| *s <= MULTIPART_THRESHOLD) {
            let mut data: Vec<u8> = Vec::with_capacity(size as usize);
            body.read_to_end(&mut data)
                .await
                .map_err(|e| StorageError::IoError {
                    path: key.clone(),
                    message: e.to_string(),
                })?;
            return self.put_single(&key, data, metadata, content_type).await;
        }

        let first_part: Vec<u8> = read_chunk(&mut body, MULTIPART_PART_SIZE, &key).await?;
        if first_part.len() < MULTIPART_PART_SIZE {
            // Whole stream fit in one part.
            return self
                .put_single(&key, first_part, metadata, content_type)
                .await;
        }

        self.put_multipart(&key, first_part, &mut body, metadata, content_type)
            .await
    }

    async fn object_exists(&self, key: &str) -> Result<bool, StorageError> {
        let key: String = self.full_key(key);
        match self
            .s3_client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(context)) if context.err().is_not_found() => Ok(false),
            Err(err) => match map_sdk_error(err, &self.bucket, &key) {
                StorageError::NotFound { .. } => Ok(false),
                other => Err(other),
            },
        }
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.endpoint, self.bucket)
    }
}

/// Read up to `limit` bytes, fewer only at end of stream.
async fn read_chunk(body: &mut ByteStream, limit: usize, key: &str) -> Result<Vec<u8>, StorageError> {
    let mut buffer: Vec<u8> = Vec::with_capacity(limit);
    (&mut *body)
        .take(limit as u64)
        .read_to_end(&mut buffer)
        .await
        .map_err(|e| StorageError::IoError {
            path: key.to_string(),
            message: e.to_string(),
        })?;
    Ok(buffer)
}

/// User metadata as sent to S3.
///
/// The content-type entry travels as the `Content-Type` header instead. S3
/// only accepts US-ASCII metadata, so other bytes are percent-encoded.
fn object_metadata(metadata: &MetadataMap) -> impl Iterator<Item = (String, String)> + '_ {
    metadata
        .iter()
        .filter(|(key, _)| !key.eq_ignore_ascii_case(CONTENT_TYPE_METADATA_KEY))
        .map(|(key, value)| (ascii_header_value(key).to_ascii_lowercase(), ascii_header_value(value)))
}

fn ascii_header_value(value: &str) -> String {
    let mut out: String = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii() && !byte.is_ascii_control() {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_header_value() {
        assert_eq!(ascii_header_value("Beach day"), "Beach day");
        assert_eq!(ascii_header_value("Café"), "Caf%C3%A9");
        assert_eq!(ascii_header_value("a\nb"), "a%0Ab");
    }

    #[test]
    fn test_content_type_not_sent_as_metadata() {
        let mut metadata: MetadataMap = MetadataMap::new();
        metadata.insert("Content-Type".into(), "image/jpeg".into());
        metadata.insert("Title".into(), "IMG_0001".into());

        let sent: Vec<(String, String)> = object_metadata(&metadata).collect();
        assert_eq!(sent, vec![("title".to_string(), "IMG_0001".to_string())]);
    }

    #[tokio::test]
    async fn test_read_chunk_stops_at_limit() {
        let mut body: ByteStream = media_relay_common::byte_stream(std::io::Cursor::new(vec![7u8; 10]));
        let first: Vec<u8> = read_chunk(&mut body, 4, "k").await.unwrap();
        let rest: Vec<u8> = read_chunk(&mut body, 100, "k").await.unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(rest.len(), 6);
    }

    #[tokio::test]
    async fn test_empty_bucket_rejected() {
        let result = S3ObjectStore::new(S3Settings::default()).await;
        assert!(matches!(result, Err(StorageError::InvalidConfig { .. })));
    }
}
