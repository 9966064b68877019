use crate::services::{
    file_store::StoreError, ledger::LedgerError, media_service::MediaError, serving::ServeError,
    validator::ValidationError,
};
use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Path, Query, Request,
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt;

/// A structured failure: HTTP status, a machine-readable reason, and a
/// message that is safe to show the caller.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub reason: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, reason and message.
    pub fn new(status: StatusCode, reason: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NotFound", msg)
    }

    pub fn bad_request(reason: &'static str, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, reason, msg)
    }

    pub fn size_exceeded(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "SizeExceeded", msg)
    }

    fn storage() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "StorageError",
            "storage failure",
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "reason": self.reason,
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Validation(err) => {
                tracing::debug!(error = %err, "upload rejected by policy");
                let status = match &err {
                    ValidationError::SizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    ValidationError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                };
                AppError::new(status, err.reason(), err.to_string())
            }
            MediaError::Decode(err) => AppError::bad_request("DecodeError", err.to_string()),
            MediaError::Store(StoreError::NotFound(_)) | MediaError::Serve(ServeError::NotFound) => {
                AppError::not_found("file not found")
            }
            MediaError::Store(StoreError::PathEscape(reference)) => {
                tracing::warn!(reference = %reference, "path traversal attempt rejected");
                AppError::not_found("file not found")
            }
            MediaError::Store(StoreError::Io(err)) | MediaError::Serve(ServeError::Io(err)) => {
                tracing::error!(error = ?err, "storage I/O failure");
                AppError::storage()
            }
            MediaError::Ledger(LedgerError::NotFound(id)) => {
                AppError::not_found(format!("media record {} not found", id))
            }
            MediaError::ImageNotFound(id) => {
                AppError::not_found(format!("image record {} not found", id))
            }
            MediaError::Ledger(LedgerError::Sqlx(err)) | MediaError::Sqlx(err) => {
                tracing::error!(error = ?err, "database failure");
                AppError::internal("database failure")
            }
            other => {
                tracing::error!(error = ?other, "unexpected media failure");
                AppError::internal("internal server error")
            }
        }
    }
}

/// Body rejections. Hitting the request body limit is the upload size cap
/// seen from the framework side, so it keeps the `SizeExceeded` reason.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            tracing::debug!("request body exceeds the configured limit");
            return AppError::size_exceeded("request body exceeds the upload size limit");
        }
        tracing::debug!(error = %rejection.body_text(), "rejected request body");
        AppError::bad_request(
            "DecodeError",
            format!("invalid request body: {}", rejection.body_text()),
        )
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::bad_request("DecodeError", rejection.body_text())
    }
}

/// A path segment that does not parse (e.g. a non-UUID id) can never name an
/// existing resource.
impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "unparseable path parameter");
        AppError::not_found("resource not found")
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::bad_request(
            "DecodeError",
            format!("invalid query string: {}", rejection.body_text()),
        )
    }
}

/// `Json<T>` whose rejection is an [`AppError`] body.
#[derive(Debug, Clone, Copy)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(inner) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(inner))
    }
}

/// `Path<T>` whose rejection is an [`AppError`] body.
#[derive(Debug, Clone, Copy)]
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(inner) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(ApiPath(inner))
    }
}

/// `Query<T>` whose rejection is an [`AppError`] body.
#[derive(Debug, Clone, Copy)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(inner) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(inner))
    }
}
