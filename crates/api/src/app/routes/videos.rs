//! Video streaming with single byte-range support.

use std::io::SeekFrom;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::app::{errors, services::AppServices};

const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable range; send the whole file.
    Full,
    Partial(ByteRange),
    Unsatisfiable,
}

/// Interpret a `Range` header against a file of `size` bytes.
///
/// Only a single `bytes=` range is honoured. Malformed headers and multi-range
/// requests fall back to the full file.
pub fn parse_range(header: &str, size: u64) -> RangeRequest {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return RangeRequest::Full;
    };
    if spec.contains(',') {
        return RangeRequest::Full;
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return RangeRequest::Full;
    };
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        // Suffix range: the last N bytes.
        let Ok(suffix) = last.parse::<u64>() else {
            return RangeRequest::Full;
        };
        if suffix == 0 || size == 0 {
            return RangeRequest::Unsatisfiable;
        }
        return RangeRequest::Partial(ByteRange {
            start: size.saturating_sub(suffix),
            end: size - 1,
        });
    }

    let Ok(start) = first.parse::<u64>() else {
        return RangeRequest::Full;
    };
    if start >= size {
        return RangeRequest::Unsatisfiable;
    }

    let end = if last.is_empty() {
        size - 1
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => end.min(size - 1),
            _ => return RangeRequest::Full,
        }
    };

    RangeRequest::Partial(ByteRange { start, end })
}

pub async fn serve_video(
    Extension(services): Extension<Arc<AppServices>>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> axum::response::Response {
    let artifacts = services.lifecycle.artifacts();
    let (mut file, size) = match artifacts.open(&filename).await {
        Ok(Some(opened)) => opened,
        Ok(None) | Err(vidgen_infra::artifacts::ArtifactError::InvalidName(_)) => {
            return errors::not_found("Video not found");
        }
        Err(e) => {
            tracing::error!(file = %filename, error = %e, "failed to open video");
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "failed to open video",
            );
        }
    };

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_range(v, size))
        .unwrap_or(RangeRequest::Full);

    match range {
        RangeRequest::Full => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, VIDEO_CONTENT_TYPE.to_string()),
                (header::CONTENT_LENGTH, size.to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            Body::from_stream(ReaderStream::new(file)),
        )
            .into_response(),
        RangeRequest::Unsatisfiable => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [
                (header::CONTENT_RANGE, format!("bytes */{size}")),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
        )
            .into_response(),
        RangeRequest::Partial(range) => {
            if let Err(e) = file.seek(SeekFrom::Start(range.start)).await {
                tracing::error!(file = %filename, error = %e, "seek failed");
                return errors::json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "failed to read video",
                );
            }
            (
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, VIDEO_CONTENT_TYPE.to_string()),
                    (
                        header::CONTENT_RANGE,
                        format!("bytes {}-{}/{size}", range.start, range.end),
                    ),
                    (header::CONTENT_LENGTH, range.len().to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                Body::from_stream(ReaderStream::new(file.take(range.len()))),
            )
                .into_response()
        }
    }
}
