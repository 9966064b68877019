//! Streaming file responses with single-range support.
//!
//! Media players seek with `Range: bytes=start-end`, so every payload
//! response advertises `Accept-Ranges: bytes` and honours one range. Multiple
//! or malformed ranges fall back to the full body.

use crate::{
    errors::AppError,
    services::{file_store::StoreError, media_service::MediaError, serving::ServedFile},
};
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    Full,
    /// Inclusive bounds.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Build the response for `served`, honouring the request's `Range` header.
pub async fn file_response(served: ServedFile, request_headers: &HeaderMap) -> Result<Response, AppError> {
    let range = request_headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_range(v, served.len))
        .unwrap_or(ByteRange::Full);

    let ServedFile {
        reference,
        mut file,
        len,
        content_type,
        cache_control,
    } = served;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", reference)) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("inline; filename=\"{}\"", reference)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    let (status, body) = match range {
        ByteRange::Full => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
            (StatusCode::OK, Body::from_stream(ReaderStream::new(file)))
        }
        ByteRange::Partial { start, end } => {
            let length = end - start + 1;
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|err| AppError::from(MediaError::Store(StoreError::Io(err))))?;
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            if let Ok(value) = HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, len)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            (
                StatusCode::PARTIAL_CONTENT,
                Body::from_stream(ReaderStream::new(file.take(length))),
            )
        }
        ByteRange::Unsatisfiable => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", len)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            (StatusCode::RANGE_NOT_SATISFIABLE, Body::empty())
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn parse_range(value: &str, len: u64) -> ByteRange {
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return ByteRange::Full;
    };
    let (first, last) = (first.trim(), last.trim());

    // suffix form: last N bytes
    if first.is_empty() {
        return match last.parse::<u64>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(_) if len == 0 => ByteRange::Unsatisfiable,
            Ok(n) => ByteRange::Partial {
                start: len.saturating_sub(n),
                end: len - 1,
            },
            Err(_) => ByteRange::Full,
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return ByteRange::Full;
    };
    let end = if last.is_empty() {
        None
    } else {
        match last.parse::<u64>() {
            Ok(end) => Some(end),
            Err(_) => return ByteRange::Full,
        }
    };

    if let Some(end) = end {
        if end < start {
            return ByteRange::Full;
        }
    }
    if start >= len {
        return ByteRange::Unsatisfiable;
    }

    ByteRange::Partial {
        start,
        end: end.map_or(len - 1, |end| end.min(len - 1)),
    }
}
