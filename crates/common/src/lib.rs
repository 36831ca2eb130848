//! Shared types and utilities for media-relay.
//!
//! This crate provides functionality used across all media-relay crates:
//! - Path utilities for archive-relative keys and journal file layout
//! - The `ByteStream` type handed from archive readers to object stores
//! - Default tuning constants
//! - Shared error types

pub mod constants;
pub mod error;
pub mod path_utils;
pub mod stream;

pub use constants::*;
pub use error::PathError;
pub use path_utils::{
    archive_journal_path, archive_name, default_journal_path, lexical_normalize, object_key,
    relative_posix_path, to_posix_path,
};
pub use stream::{byte_stream, ByteStream, MetadataMap};
