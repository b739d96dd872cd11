use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};
use serde_json::json;

use crate::app::services::AppServices;

pub const NOT_CONFIGURED: &str = "Management key or team ID not configured";

/// Best effort: always 200; failures are reported in an `error` field.
pub async fn get_balance(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let Some(billing) = &services.billing else {
        return Json(json!({ "error": NOT_CONFIGURED })).into_response();
    };

    match billing.balance().await {
        Ok(balance) => Json(balance).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to fetch balance");
            Json(json!({ "error": e.to_string() })).into_response()
        }
    }
}
