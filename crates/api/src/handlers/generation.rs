//! Generation job submission streamed as Server-Sent Events, and lookup of
//! recorded jobs.

use std::convert::Infallible;

use atelier_core::error::CoreError;
use atelier_core::generation::JobInput;
use atelier_db::models::generation_job::GenerationJobRow;
use atelier_db::repositories::generation_job_repo::GenerationJobRepo;
use atelier_pipeline::progress::ProgressEvent;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/generate
///
/// Validation errors are returned as a `400` JSON body before any stream
/// opens. Otherwise the response is an event stream of `progress` events
/// ending in one `complete` or `error` event. Dropping the stream (client
/// disconnect) cancels the job.
pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<JobInput>, JsonRejection>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Json(input) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let caller = state.identity.current_caller(&headers);

    let handle = state.orchestrator.submit(&input, caller)?;
    let job_id = handle.job_id;
    let guard = handle.cancel.clone().drop_guard();

    let stream = ReceiverStream::new(handle.events).map(move |event| {
        // Held by the stream; cancels the job when the client goes away.
        let _guard = &guard;
        tracing::trace!(job_id = %job_id, kind = event.kind(), "Streaming progress event");
        Ok(to_sse_event(&event))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// GET /api/v1/generate/{job_id}
///
/// The recorded outcome of a finished job. Jobs are only queryable when
/// they are recorded in Postgres; without a database every lookup is a 404.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<GenerationJobRow>>> {
    let id = uuid::Uuid::parse_str(&job_id)
        .map_err(|_| AppError::BadRequest(format!("Invalid job id '{job_id}'")))?;
    let not_found = || {
        AppError::Core(CoreError::NotFound {
            entity: "GenerationJob",
            id: job_id.clone(),
        })
    };

    let pool = state.pool.as_ref().ok_or_else(not_found)?;
    let job = GenerationJobRepo::find_by_job_id(pool, id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(DataResponse { data: job }))
}

fn to_sse_event(event: &ProgressEvent) -> Event {
    Event::default()
        .event(event.kind())
        .data(event.data().to_string())
}
