use axum::routing::{get, post};
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generation::generate))
        .route("/generate/{job_id}", get(generation::get_job))
}
