//! src/services/media_service.rs
//!
//! MediaService - the upload / serve / delete flow for media files:
//! validate, write the payload, then record it in the ledger. The two halves
//! are not transactional; see `delete` for which side wins.

use crate::{
    config::MediaPolicy,
    models::{
        media::{MediaRecord, NewMediaRecord},
        options::{OptionsPatch, VideoOptions},
    },
    services::{
        embed,
        file_store::{DeleteOutcome, FileStore, StoreError},
        ledger::{Ledger, LedgerError, ListFilter},
        serving::{self, ServeError, ServedFile},
        transport::{self, DecodeError},
        validator::{ValidationError, Validator},
    },
};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Serve(#[from] ServeError),
    #[error("image record `{0}` not found")]
    ImageNotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// Caller-supplied attributes of an upload.
#[derive(Clone, Debug)]
pub struct UploadMeta {
    pub filename: String,
    pub mime_type: String,
    pub owner: Option<String>,
    pub is_public: bool,
}

/// Outcome of a record delete.
#[derive(Debug)]
pub struct DeletedMedia {
    pub record: MediaRecord,
    /// False when the file was already gone or could not be removed.
    pub file_removed: bool,
}

#[derive(Clone)]
pub struct MediaService {
    ledger: Ledger,
    store: FileStore,
    validator: Validator,
    public_base_url: String,
}

impl MediaService {
    pub fn new(db: Arc<SqlitePool>, store: FileStore, policy: &MediaPolicy) -> Self {
        Self {
            ledger: Ledger::new(db),
            store,
            validator: Validator::new(policy.max_video_bytes, policy.video_types.clone()),
            public_base_url: policy.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Retrieval URL for a stored reference.
    pub fn url_for(&self, reference: &str) -> String {
        format!("{}/media/{}", self.public_base_url, reference)
    }

    /// Upload a base64 payload. The size cap is checked against the decoded
    /// length computed from the encoded text, before anything is decoded.
    pub async fn upload_encoded(&self, encoded: &str, meta: UploadMeta) -> MediaResult<MediaRecord> {
        self.validator
            .validate(transport::decoded_len(encoded), &meta.mime_type)?;
        let bytes = transport::decode(encoded)?;
        self.upload_bytes(&bytes, meta).await
    }

    /// Validate, store, then record. A failed ledger insert removes the file
    /// it just wrote.
    pub async fn upload_bytes(&self, bytes: &[u8], meta: UploadMeta) -> MediaResult<MediaRecord> {
        self.validator.validate(bytes.len() as u64, &meta.mime_type)?;

        let stored = self.store.put(bytes, &meta.filename).await?;
        let attrs = NewMediaRecord {
            reference: Some(stored.reference.clone()),
            original_name: meta.filename,
            mime_type: meta.mime_type,
            size_bytes: stored.size_bytes as i64,
            checksum: Some(stored.checksum),
            options: VideoOptions::default(),
            owner: meta.owner,
            is_public: meta.is_public,
        };

        match self.ledger.create(attrs).await {
            Ok(record) => {
                info!(id = %record.id, reference = %stored.reference, "media uploaded");
                Ok(record)
            }
            Err(err) => {
                if let Err(cleanup) = self.store.delete(&stored.reference).await {
                    warn!(reference = %stored.reference, error = %cleanup, "could not remove file after failed insert");
                }
                Err(err.into())
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> MediaResult<MediaRecord> {
        Ok(self.ledger.get(id).await?)
    }

    pub async fn list(&self, filter: &ListFilter) -> MediaResult<Vec<MediaRecord>> {
        Ok(self.ledger.list(filter).await?)
    }

    pub async fn update_options(&self, id: Uuid, patch: OptionsPatch) -> MediaResult<MediaRecord> {
        Ok(self.ledger.update_options(id, patch).await?)
    }

    /// Open a stored file for the retrieval endpoint.
    pub async fn serve(&self, reference: &str) -> MediaResult<ServedFile> {
        Ok(serving::open(&self.store, reference).await?)
    }

    /// Remove the ledger entry, then the file on a best-effort basis.
    ///
    /// A failed file removal is logged and swallowed: the record is already
    /// gone and the file is left for a reconciliation sweep.
    pub async fn delete(&self, id: Uuid) -> MediaResult<DeletedMedia> {
        let record = self.ledger.delete(id).await?;

        let file_removed = match record.reference.as_deref() {
            Some(reference) => match self.store.delete(reference).await {
                Ok(DeleteOutcome::Removed) => true,
                Ok(DeleteOutcome::AlreadyAbsent) => false,
                Err(err) => {
                    warn!(id = %id, reference = %reference, error = %err, "could not delete media file");
                    false
                }
            },
            None => false,
        };

        info!(id = %id, file_removed, "media record deleted");
        Ok(DeletedMedia {
            record,
            file_removed,
        })
    }

    /// HTML snippet for embedding the record's video.
    pub async fn embed(&self, id: Uuid, preview: bool) -> MediaResult<String> {
        let record = self.ledger.get(id).await?;
        let url = match record.reference.as_deref() {
            Some(reference) => self.url_for(reference),
            None => return Err(LedgerError::NotFound(id).into()),
        };
        Ok(if preview {
            embed::video_embed_preview(&url, &record.mime_type)
        } else {
            embed::video_embed(&url, &record.mime_type, &record.options)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use base64::{Engine as _, engine::general_purpose};
    use serde_json::json;
    use tempfile::TempDir;

    async fn service(policy: MediaPolicy) -> (TempDir, MediaService) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("media")).await.unwrap();
        let db = db::memory_pool().await.unwrap();
        (dir, MediaService::new(db, store, &policy))
    }

    fn meta(filename: &str, mime: &str) -> UploadMeta {
        UploadMeta {
            filename: filename.into(),
            mime_type: mime.into(),
            owner: None,
            is_public: true,
        }
    }

    async fn stored_file_count(service: &MediaService) -> usize {
        let mut entries = tokio::fs::read_dir(service.store().root()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn upload_serve_delete_round_trip() {
        let (_dir, service) = service(MediaPolicy::default()).await;
        let encoded = general_purpose::STANDARD.encode(b"fake mp4 bytes");

        let record = service
            .upload_encoded(&encoded, meta("intro.mp4", "video/mp4"))
            .await
            .unwrap();
        let reference = record.reference.clone().unwrap();
        assert!(reference.ends_with(".mp4"));
        assert_eq!(record.size_bytes, 14);
        assert_eq!(service.url_for(&reference), format!("/media/{}", reference));

        let served = service.serve(&reference).await.unwrap();
        assert_eq!(served.content_type, "video/mp4");
        assert_eq!(service.store().get(&reference).await.unwrap(), b"fake mp4 bytes");

        let deleted = service.delete(record.id).await.unwrap();
        assert!(deleted.file_removed);
        assert!(matches!(
            service.serve(&reference).await,
            Err(MediaError::Serve(ServeError::NotFound))
        ));
        assert!(matches!(
            service.delete(record.id).await,
            Err(MediaError::Ledger(LedgerError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn rejected_type_writes_nothing() {
        let (_dir, service) = service(MediaPolicy::default()).await;
        let encoded = general_purpose::STANDARD.encode(b"%PDF-1.7");

        let err = service
            .upload_encoded(&encoded, meta("doc.pdf", "application/pdf"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MediaError::Validation(ValidationError::UnsupportedType(_))
        ));
        assert_eq!(stored_file_count(&service).await, 0);
        assert!(service.list(&ListFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversize_is_rejected_before_decoding() {
        let policy = MediaPolicy {
            max_video_bytes: 8,
            ..Default::default()
        };
        let (_dir, service) = service(policy).await;

        // twelve bytes once decoded; the trailing garbage would fail decoding
        let encoded = format!("{}!!!!", general_purpose::STANDARD.encode([0u8; 12]));
        let err = service
            .upload_encoded(&encoded, meta("big.mp4", "video/mp4"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MediaError::Validation(ValidationError::SizeExceeded { max: 8, .. })
        ));
        assert_eq!(stored_file_count(&service).await, 0);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_decode_error() {
        let (_dir, service) = service(MediaPolicy::default()).await;
        let err = service
            .upload_encoded("@@@@", meta("a.mp4", "video/mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Decode(_)));
        assert_eq!(stored_file_count(&service).await, 0);
    }

    #[tokio::test]
    async fn delete_tolerates_missing_file() {
        let (_dir, service) = service(MediaPolicy::default()).await;
        let record = service
            .upload_bytes(b"abc", meta("a.webm", "video/webm"))
            .await
            .unwrap();
        let reference = record.reference.clone().unwrap();
        service.store().delete(&reference).await.unwrap();

        let deleted = service.delete(record.id).await.unwrap();
        assert!(!deleted.file_removed);
        assert!(matches!(
            service.get(record.id).await,
            Err(MediaError::Ledger(LedgerError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn failed_write_creates_no_record() {
        let (_dir, service) = service(MediaPolicy::default()).await;
        tokio::fs::remove_dir_all(service.store().root()).await.unwrap();

        let err = service
            .upload_bytes(b"abc", meta("a.mp4", "video/mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Store(StoreError::Io(_))));
        assert!(service.list(&ListFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_insert_removes_written_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("media")).await.unwrap();
        let db = db::memory_pool().await.unwrap();
        let service = MediaService::new(db.clone(), store, &MediaPolicy::default());
        db.close().await;

        let err = service
            .upload_bytes(b"abc", meta("a.mp4", "video/mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Ledger(LedgerError::Sqlx(_))));
        assert_eq!(stored_file_count(&service).await, 0);
    }

    #[tokio::test]
    async fn delete_swallows_file_io_failure() {
        let (_dir, service) = service(MediaPolicy::default()).await;
        let record = service
            .upload_bytes(b"abc", meta("a.mp4", "video/mp4"))
            .await
            .unwrap();
        let reference = record.reference.clone().unwrap();

        // a non-empty directory where the file was: unlink fails with a real I/O error
        let path = service.store().root().join(&reference);
        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();
        tokio::fs::write(path.join("keep"), b"x").await.unwrap();
        assert!(matches!(
            service.store().delete(&reference).await,
            Err(StoreError::Io(_))
        ));

        let deleted = service.delete(record.id).await.unwrap();
        assert!(!deleted.file_removed);
        assert!(matches!(
            service.get(record.id).await,
            Err(MediaError::Ledger(LedgerError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn options_update_and_embed() {
        let (_dir, service) = service(MediaPolicy {
            public_base_url: "https://cdn.example.com/".into(),
            ..Default::default()
        })
        .await;
        let record = service
            .upload_bytes(b"abc", meta("loop.mp4", "video/mp4"))
            .await
            .unwrap();

        let patch: OptionsPatch =
            serde_json::from_value(json!({ "autoplay": true, "loop": true })).unwrap();
        service.update_options(record.id, patch).await.unwrap();
        let patch: OptionsPatch =
            serde_json::from_value(json!({ "hideFullscreen": true })).unwrap();
        let updated = service.update_options(record.id, patch).await.unwrap();
        assert!(updated.options.autoplay && updated.options.loop_playback);
        assert!(updated.options.hide_fullscreen);

        let html = service.embed(record.id, false).await.unwrap();
        assert!(html.contains("https://cdn.example.com/media/loop_"));
        assert!(html.contains("autoplay muted playsinline loop"));

        let preview = service.embed(record.id, true).await.unwrap();
        assert!(!preview.contains("autoplay"));
    }
}
