//! HTTP handlers for media upload, listing, options, deletion and retrieval.
//! Storage concerns are delegated to `MediaService`; every failure is turned
//! into a structured `AppError` body.

use crate::{
    errors::{ApiJson, ApiPath, ApiQuery, AppError},
    handlers::file_response::file_response,
    models::{media::MediaRecord, options::{OptionsPatch, VideoOptions}},
    services::{
        ledger::{DEFAULT_PAGE_SIZE, ListFilter},
        media_service::{MediaError, UploadMeta},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::{MultipartError, MultipartRejection}},
    http::{HeaderMap, StatusCode},
    response::{Html, Response},
};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JSON body of `POST /api/media/upload`.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// Base64 payload, optionally as a `data:` URL.
    pub file_data: String,
    pub filename: String,
    pub mimetype: String,
    pub owner: Option<String>,
    pub public: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub id: Uuid,
    pub reference: String,
    pub url: String,
    pub name: String,
    pub mimetype: String,
    pub size_bytes: i64,
}

/// Query params accepted by the listing.
#[derive(Debug, Deserialize)]
pub struct ListMediaQuery {
    /// `video`, `image`, or a full MIME type.
    pub family: Option<String>,
    pub owner: Option<String>,
    pub public: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// `asc` for oldest first.
    pub order: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MediaView {
    pub id: Uuid,
    pub name: String,
    pub reference: Option<String>,
    pub url: Option<String>,
    pub mimetype: String,
    pub size_bytes: i64,
    pub owner: Option<String>,
    pub public: bool,
    pub create_date: DateTime<Utc>,
    pub options: VideoOptions,
}

#[derive(Debug, Serialize)]
pub struct ListMediaResponse {
    pub success: bool,
    pub media: Vec<MediaView>,
}

#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub success: bool,
    pub options: VideoOptions,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub file_removed: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct EmbedQuery {
    pub preview: Option<bool>,
}

/// `POST /api/media/upload` - base64 JSON upload.
pub async fn upload_media(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    tracing::info!(filename = %req.filename, mimetype = %req.mimetype, "media upload attempt");

    let meta = UploadMeta {
        filename: req.filename,
        mime_type: req.mimetype,
        owner: req.owner,
        is_public: req.public.unwrap_or(true),
    };
    let record = state.media.upload_encoded(&req.file_data, meta).await?;
    Ok(Json(upload_response(&state, record)))
}

/// `POST /api/media/upload/multipart` - `file` part plus optional `owner`
/// and `public` parts. The size cap is enforced while the part streams in.
pub async fn upload_media_multipart(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart?;
    let validator = state.media.validator().clone();
    tracing::debug!(max_bytes = validator.max_bytes(), "receiving multipart upload");
    let mut upload: Option<(String, String, BytesMut)> = None;
    let mut owner = None;
    let mut is_public = true;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                validator.check_type(&mime_type).map_err(MediaError::from)?;

                let mut buf = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    validator
                        .check_size((buf.len() + chunk.len()) as u64)
                        .map_err(MediaError::from)?;
                    buf.extend_from_slice(&chunk);
                }
                upload = Some((filename, mime_type, buf));
            }
            "owner" => owner = Some(field.text().await.map_err(multipart_error)?),
            "public" => {
                let text = field.text().await.map_err(multipart_error)?;
                is_public = !matches!(text.trim(), "false" | "0");
            }
            _ => {}
        }
    }

    let (filename, mime_type, bytes) = upload
        .ok_or_else(|| AppError::bad_request("DecodeError", "multipart body has no `file` part"))?;
    tracing::info!(filename = %filename, mimetype = %mime_type, "media multipart upload attempt");

    let meta = UploadMeta {
        filename,
        mime_type,
        owner,
        is_public,
    };
    let record = state.media.upload_bytes(&bytes, meta).await?;
    Ok(Json(upload_response(&state, record)))
}

/// `GET /api/media` - newest first unless `order=asc`.
pub async fn list_media(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<ListMediaQuery>,
) -> Result<Json<ListMediaResponse>, AppError> {
    let filter = ListFilter {
        family: q.family,
        owner: q.owner,
        is_public: q.public,
        oldest_first: q.order.as_deref().is_some_and(|o| o.eq_ignore_ascii_case("asc")),
        offset: q.offset.unwrap_or(0),
        limit: q.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    };

    let records = state.media.list(&filter).await?;
    tracing::debug!(count = records.len(), "listed media");

    let media = records
        .into_iter()
        .map(|record| media_view(&state, record))
        .collect();
    Ok(Json(ListMediaResponse {
        success: true,
        media,
    }))
}

#[derive(Debug, Serialize)]
pub struct MediaResponse {
    pub success: bool,
    pub media: MediaView,
}

/// `GET /api/media/{id}`
pub async fn get_media(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MediaResponse>, AppError> {
    let record = state.media.get(id).await?;
    Ok(Json(MediaResponse {
        success: true,
        media: media_view(&state, record),
    }))
}

/// `PATCH /api/media/{id}/options` - merge a partial option bag.
pub async fn update_media_options(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<OptionsPatch>,
) -> Result<Json<OptionsResponse>, AppError> {
    let record = state.media.update_options(id, patch).await?;
    tracing::info!(id = %id, "saved media options");
    Ok(Json(OptionsResponse {
        success: true,
        options: record.options,
    }))
}

/// `DELETE /api/media/{id}`
pub async fn delete_media(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = state.media.delete(id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        file_removed: deleted.file_removed,
        message: format!("\"{}\" deleted", deleted.record.original_name),
    }))
}

/// `GET /api/media/{id}/embed[?preview=true]`
pub async fn media_embed(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<EmbedQuery>,
) -> Result<Html<String>, AppError> {
    let html = state.media.embed(id, q.preview.unwrap_or(false)).await?;
    Ok(Html(html))
}

/// `GET /media/{reference}` - stream a stored file. HEAD is answered by the
/// same route with the body stripped.
pub async fn serve_media(
    State(state): State<AppState>,
    ApiPath(reference): ApiPath<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let served = state.media.serve(&reference).await?;
    file_response(served, &headers).await
}

fn upload_response(state: &AppState, record: MediaRecord) -> UploadResponse {
    let reference = record.reference.unwrap_or_default();
    UploadResponse {
        success: true,
        id: record.id,
        url: state.media.url_for(&reference),
        reference,
        name: record.original_name,
        mimetype: record.mime_type,
        size_bytes: record.size_bytes,
    }
}

fn media_view(state: &AppState, record: MediaRecord) -> MediaView {
    MediaView {
        id: record.id,
        url: record.reference.as_deref().map(|r| state.media.url_for(r)),
        reference: record.reference,
        name: record.original_name,
        mimetype: record.mime_type,
        size_bytes: record.size_bytes,
        owner: record.owner,
        public: record.is_public,
        create_date: record.created_at,
        options: record.options,
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::debug!("multipart body exceeds the configured limit");
        return AppError::size_exceeded("request body exceeds the upload size limit");
    }
    tracing::debug!(error = %err, "malformed multipart body");
    AppError::bad_request("DecodeError", err.body_text())
}
