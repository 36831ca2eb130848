//! Content-type resolution for uploaded objects.

use std::path::Path;

use media_relay_common::{MetadataMap, DEFAULT_CONTENT_TYPE};

/// Metadata key that overrides the extension-derived content type.
pub const CONTENT_TYPE_METADATA_KEY: &str = "Content-Type";

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "tiff", "tif", "bmp", "heic", "heif",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "wmv", "mkv", "webm", "flv", "m4v", "3gp",
];

fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// Look up the MIME type for a file name by its extension.
///
/// # Returns
/// The MIME type, or `application/octet-stream` for unknown extensions.
pub fn content_type_for(path: &str) -> &'static str {
    let Some(ext) = extension_of(path) else {
        return DEFAULT_CONTENT_TYPE;
    };

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "tiff" | "tif" => "image/tiff",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "flv" => "video/x-flv",
        "3gp" => "video/3gpp",
        "json" => "application/json",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" | "tgz" => "application/gzip",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Resolve the content type for an upload.
///
/// The extension table is consulted first; a non-empty `Content-Type` entry in
/// the file's metadata (matched case-insensitively) overrides it.
///
/// # Arguments
/// * `path` - Archive-relative path of the file
/// * `metadata` - Metadata that will be attached to the object
pub fn resolve_content_type(path: &str, metadata: &MetadataMap) -> String {
    let from_metadata: Option<&String> = metadata
        .iter()
        .find(|(key, value)| {
            key.eq_ignore_ascii_case(CONTENT_TYPE_METADATA_KEY) && !value.trim().is_empty()
        })
        .map(|(_, value)| value);

    match from_metadata {
        Some(value) => value.trim().to_string(),
        None => content_type_for(path).to_string(),
    }
}

pub fn is_image_file(path: &str) -> bool {
    extension_of(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_video_file(path: &str) -> bool {
    extension_of(path).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether a file is an image or a video.
pub fn is_media_file(path: &str) -> bool {
    is_image_file(path) || is_video_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(content_type_for("Photos/IMG_0001.JPG"), "image/jpeg");
        assert_eq!(content_type_for("Photos/clip.mov"), "video/quicktime");
        assert_eq!(content_type_for("a.heic"), "image/heic");
    }

    #[test]
    fn test_unknown_extension_defaults() {
        assert_eq!(content_type_for("README"), "application/octet-stream");
        assert_eq!(content_type_for("blob.xyz"), "application/octet-stream");
    }

    #[test]
    fn test_metadata_override() {
        let mut metadata: MetadataMap = MetadataMap::new();
        metadata.insert("content-type".into(), "image/x-custom".into());
        assert_eq!(resolve_content_type("a.jpg", &metadata), "image/x-custom");
    }

    #[test]
    fn test_blank_override_ignored() {
        let mut metadata: MetadataMap = MetadataMap::new();
        metadata.insert("Content-Type".into(), "  ".into());
        assert_eq!(resolve_content_type("a.png", &metadata), "image/png");
    }

    #[test]
    fn test_media_detection() {
        assert!(is_media_file("x/y/IMG.JPEG"));
        assert!(is_media_file("clip.3gp"));
        assert!(!is_media_file("x/y/IMG.JPEG.json"));
    }
}
