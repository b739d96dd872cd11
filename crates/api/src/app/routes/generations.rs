use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query, rejection::{JsonRejection, PathRejection}},
    http::{StatusCode, header},
    response::IntoResponse,
};

use vidgen_core::JobId;

use crate::app::{dto, errors, services::AppServices};

pub async fn create_generation(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::GenerateRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                rejection.body_text(),
            );
        }
    };

    tracing::info!(
        prompt = %vidgen_infra::generation::truncate_chars(&body.prompt, 80),
        has_image = body.image_data.as_deref().is_some_and(|s| !s.is_empty()),
        duration = body.duration,
        aspect_ratio = %body.aspect_ratio,
        resolution = %body.resolution,
        "generate request"
    );

    match services.lifecycle.create_job(body.into()).await {
        Ok(accepted) => Json(serde_json::json!({
            "id": accepted.job_id.get(),
            "request_id": accepted.request_id.as_str(),
        }))
        .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn list_generations(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListQuery>,
) -> axum::response::Response {
    match services.lifecycle.list_jobs(query.page()).await {
        Ok(page) => Json(serde_json::json!({
            "items": page.items.iter().map(dto::job_to_json).collect::<Vec<_>>(),
            "total": page.total,
        }))
        .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn get_generation(
    Extension(services): Extension<Arc<AppServices>>,
    id: Result<Path<i64>, PathRejection>,
) -> axum::response::Response {
    let id = match job_id(id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match services.lifecycle.get_job(id).await {
        Ok(Some(job)) => Json(dto::job_to_json(&job)).into_response(),
        Ok(None) => errors::not_found("Not found"),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

pub async fn get_generation_image(
    Extension(services): Extension<Arc<AppServices>>,
    id: Result<Path<i64>, PathRejection>,
) -> axum::response::Response {
    let id = match job_id(id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match services.lifecycle.get_job_image(id).await {
        Ok(Some(image)) => ([(header::CONTENT_TYPE, image.media_type)], image.bytes).into_response(),
        Ok(None) => errors::not_found("Image not found"),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

fn job_id(path: Result<Path<i64>, PathRejection>) -> Result<JobId, axum::response::Response> {
    match path {
        Ok(Path(id)) => Ok(JobId::new(id)),
        Err(rejection) => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            rejection.body_text(),
        )),
    }
}
