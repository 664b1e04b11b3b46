//! Mime type lookups.
//!
//! The desktop owns the real content-type registry. The journal only needs
//! two questions answered, so it asks them through [`MimeRegistry`];
//! [`ExtensionRegistry`] answers them from a small built-in table.

use std::path::Path;

/// Content-type registry used when synthesizing metadata and naming files.
pub trait MimeRegistry: Send + Sync {
    /// Guess the mime type of a file from its name
    fn guess(&self, path: &Path) -> Option<String>;

    /// The extension files of this type usually carry, without the dot
    fn primary_extension(&self, mime_type: &str) -> Option<String>;
}

/// Mime type given to files nothing else is known about.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// (extension, mime type); the first row for a type is its primary extension
const EXTENSIONS: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("text", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("csv", "text/csv"),
    ("rtf", "text/rtf"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("xo", "application/vnd.olpc-sugar"),
    ("xol", "application/vnd.olpc-content"),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
    ("odp", "application/vnd.oasis.opendocument.presentation"),
    ("doc", "application/msword"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("bmp", "image/bmp"),
    ("ogg", "audio/ogg"),
    ("oga", "audio/ogg"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/x-wav"),
    ("ogv", "video/ogg"),
    ("mp4", "video/mp4"),
    ("avi", "video/x-msvideo"),
];

/// Extension-based registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionRegistry;

impl ExtensionRegistry {
    pub fn new() -> Self {
        ExtensionRegistry
    }
}

impl MimeRegistry for ExtensionRegistry {
    fn guess(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?;
        EXTENSIONS
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, mime)| mime.to_string())
    }

    fn primary_extension(&self, mime_type: &str) -> Option<String> {
        EXTENSIONS
            .iter()
            .find(|(_, mime)| *mime == mime_type)
            .map(|(ext, _)| ext.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess() {
        let registry = ExtensionRegistry::new();
        assert_eq!(
            registry.guess(Path::new("/media/usb/Photo.JPG")).as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(registry.guess(Path::new("/media/usb/README")), None);
        assert_eq!(registry.guess(Path::new("/media/usb/a.unknown")), None);
    }

    #[test]
    fn test_primary_extension() {
        let registry = ExtensionRegistry::new();
        assert_eq!(registry.primary_extension("image/jpeg").as_deref(), Some("jpg"));
        assert_eq!(registry.primary_extension("text/plain").as_deref(), Some("txt"));
        assert_eq!(registry.primary_extension("application/x-nothing"), None);
    }
}
