//! Handlers for image-bearing records and their renditions.

use crate::{
    errors::{ApiJson, ApiPath, AppError},
    handlers::file_response::file_response,
    models::image::ImageRecord,
    services::{
        image_service::{NewImage, RENDITION_SIZES, Rendition},
        serving::REVALIDATE_CACHE,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateImageRequest {
    /// Host record type, e.g. `product.template`.
    pub record_type: String,
    pub name: String,
    pub filename: String,
    pub mimetype: String,
    pub file_data: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceImageRequest {
    pub filename: String,
    pub mimetype: String,
    pub file_data: String,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub success: bool,
    pub image: ImageRecord,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ImageDeleteResponse {
    pub success: bool,
    pub file_removed: bool,
}

/// `POST /api/images`
pub async fn create_image(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateImageRequest>,
) -> Result<(StatusCode, Json<ImageResponse>), AppError> {
    let attrs = NewImage {
        record_type: req.record_type,
        name: req.name,
        filename: req.filename,
        mime_type: req.mimetype,
    };
    let record = state.images.create(attrs, &req.file_data).await?;
    Ok((StatusCode::CREATED, Json(image_response(&state, record))))
}

/// `GET /api/images/{id}` - record with its format/dimension labels.
pub async fn get_image(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ImageResponse>, AppError> {
    let record = state.images.get(id).await?;
    Ok(Json(image_response(&state, record)))
}

/// `PUT /api/images/{id}` - swap the image; labels are recomputed.
pub async fn replace_image(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ReplaceImageRequest>,
) -> Result<Json<ImageResponse>, AppError> {
    let record = state
        .images
        .replace(id, &req.filename, &req.mimetype, &req.file_data)
        .await?;
    Ok(Json(image_response(&state, record)))
}

/// `DELETE /api/images/{id}`
pub async fn delete_image(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ImageDeleteResponse>, AppError> {
    let (_, file_removed) = state.images.delete(id).await?;
    Ok(Json(ImageDeleteResponse {
        success: true,
        file_removed,
    }))
}

/// `GET /images/{id}` - original bytes.
pub async fn serve_image(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let served = state.images.serve_original(id).await?;
    file_response(served, &headers).await
}

/// `GET /images/{id}/{size}` - bounded rendition. Only the published sizes
/// exist; anything else is a 404.
pub async fn serve_image_rendition(
    State(state): State<AppState>,
    ApiPath((id, size)): ApiPath<(Uuid, u32)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if !RENDITION_SIZES.contains(&size) {
        return Err(AppError::not_found(format!("no {}px rendition", size)));
    }

    match state.images.rendition(id, size).await? {
        Rendition::Original(served) => file_response(served, &headers).await,
        Rendition::Resized {
            bytes,
            content_type,
        } => Ok((
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, REVALIDATE_CACHE),
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            ],
            bytes,
        )
            .into_response()),
    }
}

fn image_response(state: &AppState, record: ImageRecord) -> ImageResponse {
    let base = state.policy.public_base_url.trim_end_matches('/');
    ImageResponse {
        success: true,
        url: format!("{}/images/{}", base, record.id),
        image: record,
    }
}
