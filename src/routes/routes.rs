//! HTTP surface of the media service.
//!
//! ## Structure
//! - **Health**
//!   - `GET    /healthz`, `GET /readyz`
//!
//! - **Media management** (under `/api/media`)
//!   - `POST   /api/media/upload` - base64 JSON upload
//!   - `POST   /api/media/upload/multipart` - streamed multipart upload
//!   - `GET    /api/media` - list records (family, owner, public, paging)
//!   - `PATCH  /api/media/{id}/options` - merge playback options
//!   - `GET    /api/media/{id}` - one record
//!   - `DELETE /api/media/{id}` - remove record and file
//!   - `GET    /api/media/{id}/embed` - HTML snippet
//!
//! - **Retrieval**
//!   - `GET|HEAD /media/{reference}` - stored bytes, range aware
//!
//! - **Images**
//!   - `POST /api/images`, `GET|PUT|DELETE /api/images/{id}`
//!   - `GET  /images/{id}` and `GET /images/{id}/{size}`

use crate::{
    config::MediaPolicy,
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::{
            create_image, delete_image, get_image, replace_image, serve_image,
            serve_image_rendition,
        },
        media_handlers::{
            delete_media, get_media, list_media, media_embed, serve_media, update_media_options,
            upload_media, upload_media_multipart,
        },
    },
    state::AppState,
};
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde_json::json;
use std::any::Any;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

/// Build the router. The body limit is derived from `policy` so a maximal
/// base64 upload is never cut off by the framework default.
pub fn routes(policy: &MediaPolicy) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // media management
        .route("/api/media", get(list_media))
        .route("/api/media/upload", post(upload_media))
        .route("/api/media/upload/multipart", post(upload_media_multipart))
        .route("/api/media/{id}", get(get_media).delete(delete_media))
        .route("/api/media/{id}/options", patch(update_media_options))
        .route("/api/media/{id}/embed", get(media_embed))
        // retrieval; `get` also answers HEAD
        .route("/media/{reference}", get(serve_media))
        // images
        .route("/api/images", post(create_image))
        .route(
            "/api/images/{id}",
            get(get_image).put(replace_image).delete(delete_image),
        )
        .route("/images/{id}", get(serve_image))
        .route("/images/{id}/{size}", get(serve_image_rendition))
        .layer(DefaultBodyLimit::max(policy.body_limit()))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
}

fn panic_response(_err: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "success": false,
            "reason": "InternalError",
            "error": "internal server error",
            "status": 500
        })),
    )
        .into_response()
}
