pub mod bridge;
pub mod generation;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /bridge/ws                 WebSocket upgrade for the bridge peer
/// /bridge/status             connection status and pending calls
/// /bridge/ping               ping round trip through the peer
/// /bridge/search             catalog search on the peer (POST)
/// /bridge/items/{id}         single catalog item from the peer
///
/// /generate                  generation job, streamed as SSE (POST)
/// /generate/{job_id}         recorded outcome of a finished job
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/bridge", bridge::router())
        .merge(generation::router())
}
