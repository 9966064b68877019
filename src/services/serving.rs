//! Resolution of a logical reference into a servable file.
//!
//! Stored payloads are immutable (a new upload always gets a new reference),
//! so responses carry a long-lived cache directive.

use crate::services::file_store::{FileStore, StoreError};
use tokio::fs::File;
use tracing::{debug, warn};

pub const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";
/// For URLs keyed by record id, whose payload can be swapped.
pub const REVALIDATE_CACHE: &str = "no-cache";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const CONTENT_TYPES: [(&str, &str); 13] = [
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("webm", "video/webm"),
    ("ogg", "video/ogg"),
    ("ogv", "video/ogg"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
];

/// An open payload ready to stream.
#[derive(Debug)]
pub struct ServedFile {
    pub reference: String,
    pub file: File,
    pub len: u64,
    pub content_type: &'static str,
    pub cache_control: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// Missing file, or a reference that tried to leave the sandbox.
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Content type from the reference's extension, falling back to
/// `application/octet-stream`.
pub fn content_type_for(reference: &str) -> &'static str {
    let Some((_, ext)) = reference.rsplit_once('.') else {
        return DEFAULT_CONTENT_TYPE;
    };
    let ext = ext.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Open `reference` in `store` for serving.
///
/// A path escape is logged as a warning and reported exactly like a missing
/// file, so callers learn nothing about the sandbox layout.
pub async fn open(store: &FileStore, reference: &str) -> Result<ServedFile, ServeError> {
    match store.open_file(reference).await {
        Ok((file, len)) => Ok(ServedFile {
            reference: reference.to_string(),
            file,
            len,
            content_type: content_type_for(reference),
            cache_control: IMMUTABLE_CACHE,
        }),
        Err(StoreError::NotFound(_)) => {
            debug!(reference = %reference, "requested file not found");
            Err(ServeError::NotFound)
        }
        Err(StoreError::PathEscape(_)) => {
            warn!(reference = %reference, "path traversal attempt rejected");
            Err(ServeError::NotFound)
        }
        Err(StoreError::Io(err)) => Err(ServeError::Io(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn maps_known_extensions() {
        assert_eq!(content_type_for("a_1_ff.mp4"), "video/mp4");
        assert_eq!(content_type_for("a_1_ff.WEBM"), "video/webm");
        assert_eq!(content_type_for("a_1_ff.mov"), "video/quicktime");
        assert_eq!(content_type_for("a_1_ff.avi"), "video/x-msvideo");
        assert_eq!(content_type_for("a_1_ff.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a_1_ff.xyz"), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_for("a_1_ff"), DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn escape_and_missing_look_the_same() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("media")).await.unwrap();
        let stored = store.put(b"frames", "clip.webm").await.unwrap();

        let served = open(&store, &stored.reference).await.unwrap();
        assert_eq!(served.len, 6);
        assert_eq!(served.content_type, "video/webm");
        assert_eq!(served.cache_control, IMMUTABLE_CACHE);

        assert!(matches!(
            open(&store, "never_issued.mp4").await,
            Err(ServeError::NotFound)
        ));
        assert!(matches!(
            open(&store, &format!("../media/../{}", stored.reference)).await,
            Err(ServeError::NotFound)
        ));
    }
}
