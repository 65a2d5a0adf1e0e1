pub mod auth;
pub mod episodes;
pub mod jobs;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;

use ca_domain::error::Error;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (health only) and **protected** (gated
/// behind the bearer-token middleware when a token is configured).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/healthz", get(health));

    let protected = Router::new()
        // Episodes (live path)
        .route("/v1/episodes", post(episodes::create_episode))
        .route("/v1/episodes", get(episodes::list_episodes))
        .route("/v1/episodes/:id", get(episodes::get_episode))
        .route("/v1/episodes/:id/states", post(episodes::submit_state))
        .route("/v1/episodes/:id/end", post(episodes::end_episode))
        .route("/v1/episodes/:id/summary", get(episodes::episode_summary))
        // Background validation
        .route("/v1/jobs/status", get(jobs::queue_status))
        .route("/v1/jobs/:episode_id/retry", post(jobs::retry_episode))
        .layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(protected)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Map a domain error onto an HTTP response. Upstream collaborator
/// failures are gateway errors (502/504); state-machine violations are
/// conflicts; everything unexpected is a 500.
pub(crate) fn error_response(e: &Error) -> (StatusCode, Json<serde_json::Value>) {
    let (status, kind) = match e {
        Error::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        Error::InvalidTransition(_) => (StatusCode::CONFLICT, "invalid_transition"),
        Error::PolicyUnavailable(_) => (StatusCode::BAD_GATEWAY, "policy_unavailable"),
        Error::BackendUnavailable(_) => (StatusCode::BAD_GATEWAY, "backend_unavailable"),
        Error::TesterUnavailable(_) => (StatusCode::BAD_GATEWAY, "tester_unavailable"),
        Error::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (
        status,
        Json(serde_json::json!({
            "error": kind,
            "message": e.to_string(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_mapping_covers_taxonomy() {
        let cases = [
            (Error::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::InvalidTransition("x".into()), StatusCode::CONFLICT),
            (Error::PolicyUnavailable("x".into()), StatusCode::BAD_GATEWAY),
            (Error::BackendUnavailable("x".into()), StatusCode::BAD_GATEWAY),
            (Error::TesterUnavailable("x".into()), StatusCode::BAD_GATEWAY),
            (Error::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (Error::Other("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(error_response(&err).0, expected, "{err}");
        }
    }
}
