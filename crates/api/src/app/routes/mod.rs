use axum::{Router, routing::{get, post}};

pub mod balance;
pub mod generations;
pub mod system;
pub mod videos;

/// Router for everything under `/api`.
pub fn router() -> Router {
    Router::new()
        .route("/generate", post(generations::create_generation))
        .route("/generations", get(generations::list_generations))
        .route("/generations/:id", get(generations::get_generation))
        .route("/generations/:id/image", get(generations::get_generation_image))
        .route("/balance", get(balance::get_balance))
        .route("/videos/:filename", get(videos::serve_video))
}
