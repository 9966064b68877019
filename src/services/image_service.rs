//! src/services/image_service.rs
//!
//! ImageService - image-bearing records. Every write of new image bytes
//! re-runs the sniffer, so format/dimension labels always describe the current
//! payload. Record types in the preserved set are never resized.

use crate::{
    config::MediaPolicy,
    models::image::{ImageKind, ImageMetadata, ImageRecord},
    services::{
        file_store::{DeleteOutcome, FileStore},
        media_service::{MediaError, MediaResult},
        serving::{self, REVALIDATE_CACHE, ServedFile},
        sniffer, transport,
        validator::Validator,
    },
};
use chrono::Utc;
use image::{DynamicImage, ImageReader, codecs::jpeg::JpegEncoder};
use sqlx::SqlitePool;
use std::{io::Cursor, sync::Arc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Rendition sizes served under `/images/{id}/{size}`.
pub const RENDITION_SIZES: [u32; 5] = [128, 256, 512, 1024, 1920];

const IMAGE_COLUMNS: &str = "id, record_type, name, reference, mime_type, size_bytes, \
                             original_format, original_dimensions, created_at, updated_at";

/// Attributes of a new image record.
#[derive(Clone, Debug)]
pub struct NewImage {
    pub record_type: String,
    pub name: String,
    pub filename: String,
    pub mime_type: String,
}

/// What the rendition endpoint should send back.
#[derive(Debug)]
pub enum Rendition {
    /// The stored bytes, untouched.
    Original(ServedFile),
    /// A downscaled copy in the source format.
    Resized {
        bytes: Vec<u8>,
        content_type: &'static str,
    },
}

#[derive(Clone)]
pub struct ImageService {
    db: Arc<SqlitePool>,
    store: FileStore,
    validator: Validator,
    policy: Arc<MediaPolicy>,
}

impl ImageService {
    pub fn new(db: Arc<SqlitePool>, store: FileStore, policy: Arc<MediaPolicy>) -> Self {
        let validator = Validator::new(policy.max_image_bytes, policy.image_types.clone());
        Self {
            db,
            store,
            validator,
            policy,
        }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Decode, validate, store and sniff a new image, then insert its record.
    pub async fn create(&self, attrs: NewImage, encoded: &str) -> MediaResult<ImageRecord> {
        let bytes = self.decode_validated(encoded, &attrs.mime_type)?;
        let stored = self.store.put(&bytes, &attrs.filename).await?;
        let metadata = sniffer::detect(&bytes);
        let now = Utc::now();

        let inserted = sqlx::query_as::<_, ImageRecord>(&format!(
            "INSERT INTO image_records ({IMAGE_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {IMAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&attrs.record_type)
        .bind(&attrs.name)
        .bind(&stored.reference)
        .bind(&attrs.mime_type)
        .bind(stored.size_bytes as i64)
        .bind(metadata.as_ref().map(|m| m.format.label()))
        .bind(metadata.as_ref().map(ImageMetadata::dimensions_label))
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await;

        match inserted {
            Ok(record) => {
                log_detection(&record, metadata.as_ref());
                Ok(record)
            }
            Err(err) => {
                self.discard(&stored.reference).await;
                Err(err.into())
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> MediaResult<ImageRecord> {
        sqlx::query_as::<_, ImageRecord>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM image_records WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(MediaError::ImageNotFound(id))
    }

    /// Swap the record's image. Labels are recomputed from the new bytes;
    /// when detection fails they are cleared rather than left stale.
    pub async fn replace(
        &self,
        id: Uuid,
        filename: &str,
        mime_type: &str,
        encoded: &str,
    ) -> MediaResult<ImageRecord> {
        let previous = self.get(id).await?;
        let bytes = self.decode_validated(encoded, mime_type)?;
        let stored = self.store.put(&bytes, filename).await?;
        let metadata = sniffer::detect(&bytes);

        let updated = sqlx::query_as::<_, ImageRecord>(&format!(
            "UPDATE image_records
             SET reference = ?, mime_type = ?, size_bytes = ?,
                 original_format = ?, original_dimensions = ?, updated_at = ?
             WHERE id = ?
             RETURNING {IMAGE_COLUMNS}"
        ))
        .bind(&stored.reference)
        .bind(mime_type)
        .bind(stored.size_bytes as i64)
        .bind(metadata.as_ref().map(|m| m.format.label()))
        .bind(metadata.as_ref().map(ImageMetadata::dimensions_label))
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await;

        let record = match updated {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.discard(&stored.reference).await;
                return Err(MediaError::ImageNotFound(id));
            }
            Err(err) => {
                self.discard(&stored.reference).await;
                return Err(err.into());
            }
        };

        if let Err(err) = self.store.delete(&previous.reference).await {
            warn!(id = %id, reference = %previous.reference, error = %err, "could not delete replaced image");
        }
        log_detection(&record, metadata.as_ref());
        Ok(record)
    }

    /// Delete the record, then its file on a best-effort basis.
    pub async fn delete(&self, id: Uuid) -> MediaResult<(ImageRecord, bool)> {
        let record = sqlx::query_as::<_, ImageRecord>(&format!(
            "DELETE FROM image_records WHERE id = ? RETURNING {IMAGE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(MediaError::ImageNotFound(id))?;

        let file_removed = match self.store.delete(&record.reference).await {
            Ok(DeleteOutcome::Removed) => true,
            Ok(DeleteOutcome::AlreadyAbsent) => false,
            Err(err) => {
                warn!(id = %id, reference = %record.reference, error = %err, "could not delete image file");
                false
            }
        };

        info!(id = %id, file_removed, "image record deleted");
        Ok((record, file_removed))
    }

    /// Open the original bytes. The content type follows the sniffed format
    /// when known, not the uploader's claim.
    pub async fn serve_original(&self, id: Uuid) -> MediaResult<ServedFile> {
        let record = self.get(id).await?;
        let mut served = serving::open(&self.store, &record.reference).await?;
        if let Some(mime) = record.detected_kind().and_then(ImageKind::mime_type) {
            served.content_type = mime;
        }
        served.cache_control = REVALIDATE_CACHE;
        Ok(served)
    }

    /// Serve the record's image bounded to `size` pixels.
    ///
    /// Preserved record types always get the original. Others get a
    /// downscaled copy; images already within bounds are never upscaled.
    pub async fn rendition(&self, id: Uuid, size: u32) -> MediaResult<Rendition> {
        let record = self.get(id).await?;

        if self.policy.is_preserved(&record.record_type) {
            debug!(id = %id, record_type = %record.record_type, "serving original image without processing");
            return Ok(Rendition::Original(self.serve_original(id).await?));
        }

        let kind = record.detected_kind().unwrap_or(ImageKind::Unknown);
        let Some(content_type) = kind.mime_type() else {
            return Ok(Rendition::Original(self.serve_original(id).await?));
        };

        let bytes = self.store.get(&record.reference).await?;
        let quality = self.policy.jpeg_quality;
        let resized =
            tokio::task::spawn_blocking(move || downscale(&bytes, kind, size, quality)).await??;

        match resized {
            Some(bytes) => Ok(Rendition::Resized {
                bytes,
                content_type,
            }),
            None => Ok(Rendition::Original(self.serve_original(id).await?)),
        }
    }

    /// Remove a file written for a record update that did not land.
    async fn discard(&self, reference: &str) {
        if let Err(err) = self.store.delete(reference).await {
            warn!(reference = %reference, error = %err, "could not remove orphaned image file");
        }
    }

    fn decode_validated(&self, encoded: &str, mime_type: &str) -> MediaResult<Vec<u8>> {
        self.validator
            .validate(transport::decoded_len(encoded), mime_type)?;
        Ok(transport::decode(encoded)?)
    }
}

fn log_detection(record: &ImageRecord, metadata: Option<&ImageMetadata>) {
    match metadata {
        Some(meta) => info!(
            id = %record.id,
            format = %meta.format,
            dimensions = %meta.dimensions_label(),
            "image stored"
        ),
        None => debug!(id = %record.id, "image stored; format could not be detected"),
    }
}

/// Shrink `bytes` so neither side exceeds `size`, re-encoding in `kind`.
/// Returns `None` when the image already fits or cannot be decoded.
fn downscale(
    bytes: &[u8],
    kind: ImageKind,
    size: u32,
    jpeg_quality: u8,
) -> Result<Option<Vec<u8>>, image::ImageError> {
    let Some(format) = sniffer::image_format_of(kind) else {
        return Ok(None);
    };

    let img = match ImageReader::with_format(Cursor::new(bytes), format).decode() {
        Ok(img) => img,
        Err(err) => {
            debug!(error = %err, "could not decode image for rendition");
            return Ok(None);
        }
    };
    if img.width() <= size && img.height() <= size {
        return Ok(None);
    }

    let scaled = img.thumbnail(size, size);
    let mut out = Cursor::new(Vec::new());
    if kind == ImageKind::Jpeg {
        let encoder = JpegEncoder::new_with_quality(&mut out, jpeg_quality);
        DynamicImage::ImageRgb8(scaled.to_rgb8()).write_with_encoder(encoder)?;
    } else {
        scaled.write_to(&mut out, format)?;
    }
    Ok(Some(out.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, services::sniffer::tests::encode};
    use base64::{Engine as _, engine::general_purpose};
    use image::ImageFormat;
    use tempfile::TempDir;

    async fn service() -> (TempDir, ImageService) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("images")).await.unwrap();
        let db = db::memory_pool().await.unwrap();
        (
            dir,
            ImageService::new(db, store, Arc::new(MediaPolicy::default())),
        )
    }

    fn b64(bytes: &[u8]) -> String {
        general_purpose::STANDARD.encode(bytes)
    }

    fn new_image(record_type: &str, filename: &str, mime: &str) -> NewImage {
        NewImage {
            record_type: record_type.into(),
            name: "Test".into(),
            filename: filename.into(),
            mime_type: mime.into(),
        }
    }

    #[tokio::test]
    async fn create_detects_png_labels() {
        let (_dir, service) = service().await;
        let png = encode(ImageFormat::Png, 10, 10);

        let record = service
            .create(new_image("product.image", "a.png", "image/png"), &b64(&png))
            .await
            .unwrap();

        assert!(record.reference.ends_with(".png"));
        assert_eq!(record.original_format.as_deref(), Some("PNG"));
        assert_eq!(record.original_dimensions.as_deref(), Some("10 x 10 px"));
        assert_eq!(service.store.get(&record.reference).await.unwrap(), png);
    }

    #[tokio::test]
    async fn replace_recomputes_labels() {
        let (_dir, service) = service().await;
        let record = service
            .create(
                new_image("product.image", "a.png", "image/png"),
                &b64(&encode(ImageFormat::Png, 800, 600)),
            )
            .await
            .unwrap();

        let jpeg = encode(ImageFormat::Jpeg, 1024, 768);
        let replaced = service
            .replace(record.id, "b.jpg", "image/jpeg", &b64(&jpeg))
            .await
            .unwrap();
        assert_eq!(replaced.original_format.as_deref(), Some("JPEG"));
        assert_eq!(replaced.original_dimensions.as_deref(), Some("1024 x 768 px"));
        assert_ne!(replaced.reference, record.reference);
        assert!(service.store.get(&record.reference).await.is_err());

        // undetectable payload clears the labels
        let cleared = service
            .replace(record.id, "c.png", "image/png", &b64(b"not an image"))
            .await
            .unwrap();
        assert_eq!(cleared.original_format, None);
        assert_eq!(cleared.original_dimensions, None);
    }

    #[tokio::test]
    async fn preserved_types_are_never_resized() {
        let (_dir, service) = service().await;
        let png = encode(ImageFormat::Png, 600, 300);
        let record = service
            .create(new_image("product.template", "big.png", "image/png"), &b64(&png))
            .await
            .unwrap();

        match service.rendition(record.id, 128).await.unwrap() {
            Rendition::Original(served) => {
                assert_eq!(served.len, png.len() as u64);
                assert_eq!(served.content_type, "image/png");
            }
            Rendition::Resized { .. } => panic!("preserved image was resized"),
        }
    }

    #[tokio::test]
    async fn other_types_get_downscaled_renditions() {
        let (_dir, service) = service().await;
        let record = service
            .create(
                new_image("blog.post", "big.jpg", "image/jpeg"),
                &b64(&encode(ImageFormat::Jpeg, 600, 300)),
            )
            .await
            .unwrap();

        match service.rendition(record.id, 128).await.unwrap() {
            Rendition::Resized {
                bytes,
                content_type,
            } => {
                assert_eq!(content_type, "image/jpeg");
                let meta = sniffer::detect(&bytes).unwrap();
                assert_eq!(meta.format, ImageKind::Jpeg);
                assert_eq!((meta.width, meta.height), (128, 64));
            }
            Rendition::Original(_) => panic!("expected a resized rendition"),
        }

        // already within bounds: original bytes
        assert!(matches!(
            service.rendition(record.id, 1024).await.unwrap(),
            Rendition::Original(_)
        ));
    }

    #[tokio::test]
    async fn rejects_unsupported_type_without_writing() {
        let (_dir, service) = service().await;
        let err = service
            .create(new_image("product.image", "a.pdf", "application/pdf"), &b64(b"%PDF"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Validation(_)));
        let mut entries = tokio::fs::read_dir(service.store.root()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_record_and_file() {
        let (_dir, service) = service().await;
        let record = service
            .create(
                new_image("product.image", "a.gif", "image/gif"),
                &b64(&encode(ImageFormat::Gif, 4, 4)),
            )
            .await
            .unwrap();

        let (deleted, file_removed) = service.delete(record.id).await.unwrap();
        assert_eq!(deleted.id, record.id);
        assert!(file_removed);
        assert!(matches!(
            service.get(record.id).await,
            Err(MediaError::ImageNotFound(_))
        ));
        assert!(matches!(
            service.serve_original(record.id).await,
            Err(MediaError::ImageNotFound(_))
        ));
    }
}
