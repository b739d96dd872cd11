use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use vidgen_infra::jobs::LifecycleError;

pub fn lifecycle_error_to_response(err: LifecycleError) -> axum::response::Response {
    match err {
        LifecycleError::Validation(e) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
        LifecycleError::Upstream(e) => json_error(
            StatusCode::BAD_GATEWAY,
            "upstream_error",
            format!("xAI API error: {e}"),
        ),
        LifecycleError::Conflict(request_id) => json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("generation {request_id} already exists"),
        ),
        LifecycleError::Storage(e) => {
            error!(error = %e, "job store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn not_found(message: &'static str) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", message)
}
