//! MIME type resolution from filename extensions
//!
//! Content sniffing is not attempted; only the extension is consulted.

use std::path::Path;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
pub const TEXT_MIME_TYPE: &str = "text/plain";

const EXTENSION_TABLE: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("text", "text/plain"),
    ("log", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("tsv", "text/tab-separated-values"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("mjs", "text/javascript"),
    ("xml", "application/xml"),
    ("json", "application/json"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    ("toml", "application/toml"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("zst", "application/zstd"),
    ("wasm", "application/wasm"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
];

/// Look up a MIME type for `filename` by its extension (case-insensitive)
pub fn from_filename(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    EXTENSION_TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Resolve the MIME type to record for a stored payload
///
/// Explicit type first, then the filename extension, then `fallback`.
pub fn resolve(explicit: Option<&str>, filename: Option<&str>, fallback: &str) -> String {
    explicit
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
        .or_else(|| filename.and_then(from_filename).map(str::to_string))
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(from_filename("test.txt"), Some("text/plain"));
        assert_eq!(from_filename("photo.JPG"), Some("image/jpeg"));
        assert_eq!(from_filename("dir/data.json"), Some("application/json"));
    }

    #[test]
    fn test_unknown_or_missing_extension() {
        assert_eq!(from_filename("blob.xyz"), None);
        assert_eq!(from_filename("README"), None);
    }

    #[test]
    fn test_resolve_precedence() {
        assert_eq!(
            resolve(Some("image/png"), Some("a.txt"), DEFAULT_MIME_TYPE),
            "image/png"
        );
        assert_eq!(resolve(None, Some("a.txt"), DEFAULT_MIME_TYPE), "text/plain");
        assert_eq!(resolve(None, Some("a.bin"), DEFAULT_MIME_TYPE), DEFAULT_MIME_TYPE);
        assert_eq!(resolve(None, None, TEXT_MIME_TYPE), TEXT_MIME_TYPE);
        assert_eq!(resolve(Some(""), None, DEFAULT_MIME_TYPE), DEFAULT_MIME_TYPE);
    }
}
