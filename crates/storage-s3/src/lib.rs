//! AWS SDK S3 backend for media-relay.
//!
//! Provides an [`ObjectStore`](media_relay_storage::ObjectStore) implementation for
//! AWS S3 and S3-compatible services (MinIO, Ceph, ...).
//!
//! # Example
//!
//! ```ignore
//! use media_relay_storage_s3::{S3ObjectStore, S3Settings};
//!
//! let settings = S3Settings::new("photos")
//!     .with_endpoint("minio.local:9000")
//!     .with_credentials("access", "secret");
//! let store = S3ObjectStore::connect(settings).await?;
//! ```

mod client;
mod error;
mod settings;

pub use client::S3ObjectStore;
pub use settings::S3Settings;
