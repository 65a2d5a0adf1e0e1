//! Background-validation API.
//!
//! - `GET  /v1/jobs/status`             — queue counters (drain barrier)
//! - `POST /v1/jobs/:episode_id/retry`  — re-enqueue a failed episode

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use uuid::Uuid;

use crate::api::error_response;
use crate::state::AppState;

/// Read-only queue counters. External coordination (e.g. a training loop
/// waiting for all episodes to validate) polls this until
/// `pending == 0 && in_flight == 0`.
pub async fn queue_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.queue_status())
}

/// Re-enqueue validation for an episode whose job failed (or was never
/// queued because the queue was full). Subject to the same at-most-one-job
/// guard as the automatic enqueue.
pub async fn retry_episode(
    State(state): State<AppState>,
    Path(episode_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.orchestrator.enqueue(episode_id) {
        Ok(()) => Json(serde_json::json!({
            "episode_id": episode_id,
            "enqueued": true,
        }))
        .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}
