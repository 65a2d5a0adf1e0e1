//! Episode API endpoints — the live request path.
//!
//! - `POST /v1/episodes`              — start an episode
//! - `POST /v1/episodes/:id/states`   — submit a state (the full pipeline)
//! - `POST /v1/episodes/:id/end`      — end + enqueue validation
//! - `GET  /v1/episodes[/:id]`        — inspection
//! - `GET  /v1/episodes/:id/summary`  — aggregate statistics

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ca_domain::action::Action;
use ca_domain::episode::Cursor;
use ca_domain::error::Error;

use crate::api::error_response;
use crate::runtime::{self, SubmitStateRequest};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateEpisodeBody {
    pub problem_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitStateBody {
    pub code: String,
    pub cursor: Cursor,
    /// Explicit action (pass-through). When absent, the policy service
    /// chooses.
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(default)]
    pub target_line: Option<u32>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create_episode(
    State(state): State<AppState>,
    Json(body): Json<CreateEpisodeBody>,
) -> impl IntoResponse {
    if body.problem_id.trim().is_empty() {
        return error_response(&Error::InvalidArgument("problem_id is empty".into()))
            .into_response();
    }
    // With a loaded library, unknown problems are rejected up front; with
    // an empty library recording is still allowed and validation jobs fail
    // cleanly later.
    if !state.problems.is_empty() && !state.problems.contains(&body.problem_id) {
        return error_response(&Error::InvalidArgument(format!(
            "unknown problem_id '{}'",
            body.problem_id
        )))
        .into_response();
    }

    match state.store.create(&body.problem_id) {
        Ok(episode) => (StatusCode::CREATED, Json(episode)).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn list_episodes(State(state): State<AppState>) -> impl IntoResponse {
    let episodes = state.store.list();
    let items: Vec<serde_json::Value> = episodes
        .iter()
        .map(|ep| {
            serde_json::json!({
                "id": ep.id,
                "problem_id": ep.problem_id,
                "status": ep.status,
                "states": ep.states.len(),
                "created_at": ep.created_at,
                "ended_at": ep.ended_at,
            })
        })
        .collect();
    Json(serde_json::json!({ "episodes": items, "total": items.len() }))
}

pub async fn get_episode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store.get(id) {
        Some(episode) => Json(episode).into_response(),
        None => error_response(&Error::NotFound(format!("episode {id}"))).into_response(),
    }
}

pub async fn episode_summary(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store.get(id) {
        Some(episode) => Json(ca_engine::summarize(&episode)).into_response(),
        None => error_response(&Error::NotFound(format!("episode {id}"))).into_response(),
    }
}

pub async fn submit_state(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SubmitStateBody>,
) -> impl IntoResponse {
    // One submit per episode at a time; a concurrent caller is told to back
    // off rather than queued (states are strictly ordered).
    let _permit = match state.episode_locks.try_acquire(id) {
        Ok(p) => p,
        Err(busy) => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({ "error": "episode_busy", "message": busy.to_string() })),
            )
                .into_response();
        }
    };

    let req = SubmitStateRequest {
        code: body.code,
        cursor: body.cursor,
        action: body.action,
        target_line: body.target_line,
    };

    let cancel = CancellationToken::new();
    match runtime::submit_state(&state, id, req, &cancel).await {
        Ok(outcome) => Json(serde_json::json!({
            "state_index": outcome.state_index,
            "stream_interrupted": outcome.stream_interrupted,
            "state": outcome.state,
        }))
        .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

pub async fn end_episode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    // The submit lock also serializes end against in-flight submits.
    let _permit = match state.episode_locks.try_acquire(id) {
        Ok(p) => p,
        Err(busy) => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({ "error": "episode_busy", "message": busy.to_string() })),
            )
                .into_response();
        }
    };

    match runtime::end_episode(&state, id) {
        Ok(episode) => Json(episode).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}
