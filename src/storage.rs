//! Upload storage.
//!
//! Image files live on disk under the configured uploads directory, keyed by
//! owner and the book or chapter they belong to. The database row is the
//! source of truth; a file without a row is garbage and gets removed by the
//! compensating delete in [`Storage::store_image`]'s caller path.

use crate::error::{AppError, Result};
use std::path::PathBuf;
use tracing::warn;

/// Allowed image MIME types and their extensions.
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// Filesystem storage for uploaded images.
#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
    max_upload_bytes: u64,
}

/// A stored file, ready to be referenced from an image row.
#[derive(Debug)]
pub struct StoredFile {
    /// Path relative to the storage root.
    pub relative_path: String,
    /// Detected MIME type.
    pub mime_type: String,
    /// Size on disk in bytes.
    pub file_size: i64,
}

impl Storage {
    /// Create a storage rooted at the given directory.
    pub fn new(root: PathBuf, max_upload_bytes: u64) -> Self {
        Self {
            root,
            max_upload_bytes,
        }
    }

    /// Absolute path for a stored relative path.
    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    /// Sniff the image format from the file bytes. The client-supplied
    /// content type is not trusted.
    fn detect_mime(bytes: &[u8]) -> Result<&'static str> {
        let format = image::guess_format(bytes)
            .map_err(|_| AppError::Validation("Unrecognized image format".to_string()))?;

        let mime = match format {
            image::ImageFormat::Jpeg => "image/jpeg",
            image::ImageFormat::Png => "image/png",
            image::ImageFormat::Gif => "image/gif",
            image::ImageFormat::WebP => "image/webp",
            _ => {
                return Err(AppError::Validation(
                    "Only JPEG, PNG, GIF and WebP images are accepted".to_string(),
                ));
            }
        };
        Ok(mime)
    }

    fn extension_for(mime: &str) -> &'static str {
        ALLOWED_TYPES
            .iter()
            .find(|(m, _)| *m == mime)
            .map(|(_, ext)| *ext)
            .unwrap_or("bin")
    }

    /// Write upload bytes to `{owner_id}/{scope_id}/{image_id}.{ext}` and
    /// return the stored metadata.
    pub fn store_image(
        &self,
        owner_id: &str,
        scope_id: &str,
        image_id: &str,
        bytes: &[u8],
    ) -> Result<StoredFile> {
        if ![owner_id, scope_id, image_id]
            .iter()
            .all(|s| is_safe_segment(s))
        {
            return Err(AppError::Validation(
                "Invalid storage path segment".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(AppError::Validation("Empty upload".to_string()));
        }
        if bytes.len() as u64 > self.max_upload_bytes {
            return Err(AppError::Validation(format!(
                "Upload exceeds the {} byte limit",
                self.max_upload_bytes
            )));
        }

        let mime = Self::detect_mime(bytes)?;
        let ext = Self::extension_for(mime);

        let dir = self.root.join(owner_id).join(scope_id);
        std::fs::create_dir_all(&dir)?;

        let relative_path = format!("{}/{}/{}.{}", owner_id, scope_id, image_id, ext);
        std::fs::write(self.root.join(&relative_path), bytes)?;

        Ok(StoredFile {
            relative_path,
            mime_type: mime.to_string(),
            file_size: bytes.len() as i64,
        })
    }

    /// Remove a stored file. Used both for normal image deletion and as the
    /// compensating step when the database insert after an upload fails.
    pub fn remove(&self, relative_path: &str) {
        let path = self.resolve(relative_path);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove stored file {}: {}", path.display(), e);
            }
        }
    }

    /// Read a stored file back.
    pub fn read(&self, relative_path: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative_path);
        if !path.starts_with(&self.root) || relative_path.contains("..") {
            return Err(AppError::NotFound("File not found".to_string()));
        }
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound("File not found".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("root", &self.root)
            .finish()
    }
}

/// Check whether a path segment is safe to embed in a storage path.
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    // Smallest valid PNG: 1x1 transparent pixel.
    const TINY_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x62, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn test_store_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), 1024 * 1024);

        let stored = storage
            .store_image("user-1", "book-1", "img-1", TINY_PNG)
            .unwrap();
        assert_eq!(stored.mime_type, "image/png");
        assert_eq!(stored.relative_path, "user-1/book-1/img-1.png");

        let bytes = storage.read(&stored.relative_path).unwrap();
        assert_eq!(bytes, TINY_PNG);
    }

    #[test]
    fn test_rejects_non_image_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), 1024);

        let err = storage
            .store_image("user-1", "book-1", "img-1", b"not an image")
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_rejects_oversize_upload() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), 16);

        let err = storage
            .store_image("user-1", "book-1", "img-1", TINY_PNG)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), 1024 * 1024);

        let stored = storage
            .store_image("user-1", "book-1", "img-1", TINY_PNG)
            .unwrap();
        storage.remove(&stored.relative_path);
        storage.remove(&stored.relative_path);
        assert!(matches!(
            storage.read(&stored.relative_path),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_rejects_unsafe_path_segments() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), 1024 * 1024);

        let err = storage
            .store_image("../user-1", "book-1", "img-1", TINY_PNG)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = storage
            .store_image("user-1", "book-1", "img/1", TINY_PNG)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_safe_segment() {
        assert!(is_safe_segment("abc-123_X"));
        assert!(!is_safe_segment(""));
        assert!(!is_safe_segment("../etc"));
        assert!(!is_safe_segment("a/b"));
    }
}
