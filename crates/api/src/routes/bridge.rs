use axum::routing::{get, post};
use axum::Router;

use crate::handlers::bridge;
use crate::state::AppState;
use crate::ws;

/// Bridge routes, mounted at `/api/v1/bridge`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::bridge_ws_handler))
        .route("/status", get(bridge::status))
        .route("/ping", get(bridge::ping))
        .route("/search", post(bridge::search))
        .route("/items/{id}", get(bridge::get_item))
}
