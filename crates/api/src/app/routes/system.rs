use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{StatusCode, header},
    response::IntoResponse,
};

use crate::app::{errors, services::AppServices};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// The single-page UI, never cached.
pub async fn index(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let path = services.static_dir.join("index.html");
    match tokio::fs::read(&path).await {
        Ok(html) => (
            [
                (header::CONTENT_TYPE, "text/html; charset=utf-8"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            html,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "index.html unavailable");
            errors::not_found("index.html not found")
        }
    }
}
