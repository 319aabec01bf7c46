//! Handlers proxying typed calls to the connected bridge peer.

use std::time::Instant;

use atelier_bridge::messages::{REQ_GET_ITEM, REQ_PING, REQ_SEARCH};
use atelier_bridge::slot::SlotStatus;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Most results a search may ask the peer for.
pub const MAX_SEARCH_LIMIT: u32 = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    #[serde(flatten)]
    pub slot: SlotStatus,
    /// Calls awaiting a response.
    pub pending: usize,
}

/// GET /api/v1/bridge/status
pub async fn status(State(state): State<AppState>) -> Json<DataResponse<BridgeStatus>> {
    Json(DataResponse {
        data: BridgeStatus {
            slot: state.bridge.slot().status(),
            pending: state.bridge.registry().pending_count(),
        },
    })
}

/// GET /api/v1/bridge/ping
///
/// Returns the peer's `{pong, timestamp}` plus the measured round trip.
pub async fn ping(State(state): State<AppState>) -> AppResult<Json<DataResponse<Value>>> {
    let started = Instant::now();
    let mut data = state.bridge.call(REQ_PING, None).await?;
    let round_trip_ms = started.elapsed().as_millis() as u64;

    if let Value::Object(map) = &mut data {
        map.insert("roundTripMs".into(), json!(round_trip_ms));
    }
    Ok(Json(DataResponse { data }))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<u32>,
}

/// POST /api/v1/bridge/search
pub async fn search(
    State(state): State<AppState>,
    Json(input): Json<SearchRequest>,
) -> AppResult<Json<DataResponse<Value>>> {
    let query = input.query.trim();
    if query.is_empty() {
        return Err(AppError::BadRequest("query must not be empty".into()));
    }

    let mut params = json!({ "query": query });
    if let Some(limit) = input.limit {
        params["limit"] = json!(limit.clamp(1, MAX_SEARCH_LIMIT));
    }

    let data = state.bridge.call(REQ_SEARCH, Some(params)).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/bridge/items/{id}
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<Value>>> {
    let data = state
        .bridge
        .call(REQ_GET_ITEM, Some(json!({ "id": id })))
        .await?;
    Ok(Json(DataResponse { data }))
}
