//! Core runtime — the orchestrator that ties action selection, prompt
//! building, completion streaming, attribution, and persistence into one
//! sequential pipeline per request.
//!
//! Entry point: [`submit_state`]. The caller (API layer) holds the episode's
//! submit lock for the duration; independent episodes run fully in
//! parallel. Requests are validated structurally before any side effect —
//! the only mutation is the final store append.

pub mod episode_lock;
pub mod harness;
pub mod streamer;
pub mod testjobs;

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ca_domain::action::{Action, ActionSource};
use ca_domain::diff::Diff;
use ca_domain::episode::{Cursor, Episode, State};
use ca_domain::error::{Error, Result};
use ca_engine::attribution::advance_attribution;
use ca_engine::diff::apply_diff;
use ca_engine::fim::build_fim_prompt;

use crate::state::AppState;
use self::streamer::stream_to_diff;

/// Hard cap on submitted snapshots; an editor buffer past this is a client
/// bug, not a workload.
const MAX_CODE_BYTES: usize = 512 * 1024;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / outcome types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One submit-state request, already deserialized by the API layer.
#[derive(Debug, Clone)]
pub struct SubmitStateRequest {
    /// Current editor snapshot.
    pub code: String,
    pub cursor: Cursor,
    /// Explicit action (pass-through, no policy call). Must come with
    /// `target_line`.
    pub action: Option<Action>,
    pub target_line: Option<u32>,
}

/// What a submit produced.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub state: State,
    pub state_index: usize,
    /// The completion stream was cut short; `state.diff` is the partial
    /// result, returned per contract rather than discarded.
    pub stream_interrupted: bool,
}

/// Structural validation. Runs before any component is invoked, so a
/// rejected request has zero side effects.
pub fn validate_request(req: &SubmitStateRequest) -> Result<()> {
    if req.cursor.line == 0 {
        return Err(Error::InvalidArgument("cursor.line is 1-based".into()));
    }
    if req.action.is_some() != req.target_line.is_some() {
        return Err(Error::InvalidArgument(
            "action and target_line must be provided together".into(),
        ));
    }
    if req.target_line == Some(0) {
        return Err(Error::InvalidArgument("target_line is 1-based".into()));
    }
    if req.code.len() > MAX_CODE_BYTES {
        return Err(Error::InvalidArgument(format!(
            "code snapshot exceeds {MAX_CODE_BYTES} bytes"
        )));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// submit_state — the live pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one episode step: resolve the action, build the FIM prompt, stream
/// the completion into a diff, attribute lines, and append the state.
///
/// The caller must hold the episode's submit lock.
pub async fn submit_state(
    app: &AppState,
    episode_id: Uuid,
    req: SubmitStateRequest,
    cancel: &CancellationToken,
) -> Result<SubmitOutcome> {
    validate_request(&req)?;

    let episode = app
        .store
        .get(episode_id)
        .ok_or_else(|| Error::NotFound(format!("episode {episode_id}")))?;
    if !episode.status.accepts_states() {
        return Err(Error::InvalidTransition(format!(
            "episode {episode_id} is {}, not active",
            episode.status
        )));
    }

    // 1. Resolve the action: explicit pass-through, or policy lookup.
    let (action, target_line, action_source) = match (req.action, req.target_line) {
        (Some(action), Some(line)) => (action, line, ActionSource::Human),
        _ => {
            let decision = app.policy.select_action(&req.code, req.cursor).await?;
            (decision.action, decision.line, ActionSource::Assistant)
        }
    };

    // 2. Build the FIM prompt (validates target_line bounds).
    let prompt = build_fim_prompt(&req.code, req.cursor, action, target_line)?;

    // 3. Stream the completion into a diff. NoOp short-circuits with an
    //    identity diff and no backend call.
    let (diff, stream_interrupted) = if action.needs_completion() {
        let timeout = Duration::from_secs(app.config.completion.timeout_secs);
        let out = stream_to_diff(
            app.completion.as_ref(),
            &prompt,
            &req.code,
            timeout,
            cancel,
        )
        .await?;
        (out.diff, out.interrupted)
    } else {
        (Diff::identity(req.code.lines().count() as u32), false)
    };

    // 4. Attribute lines: human drift since the previous state, then the
    //    streamed insertions.
    let prev = episode.last_state();
    let prev_attr = prev.map(|s| s.attribution.clone()).unwrap_or_default();
    let prev_post = prev
        .map(|s| apply_diff(&s.code, &s.diff))
        .unwrap_or_default();
    let attribution = advance_attribution(&prev_attr, &prev_post, &req.code, &diff);

    // 5. Append. The store logs before acknowledging.
    let state = State {
        code: req.code,
        cursor: req.cursor,
        action,
        action_source,
        target_line,
        diff,
        attribution,
        env: None,
        timestamp: Utc::now(),
    };
    let state = app.store.append_state(episode_id, state)?;
    let state_index = app
        .store
        .get(episode_id)
        .map(|e| e.states.len() - 1)
        .unwrap_or(0);

    Ok(SubmitOutcome {
        state,
        state_index,
        stream_interrupted,
    })
}

/// End an episode and hand it to the test orchestrator.
///
/// The transition and the enqueue are deliberately two steps: if the queue
/// rejects the job (full, shutting down) the episode stays `TestsPending`
/// with no active job, and the retry endpoint can re-enqueue it later.
pub fn end_episode(app: &AppState, episode_id: Uuid) -> Result<Episode> {
    app.store.end(episode_id)?;
    app.orchestrator.enqueue(episode_id)?;

    app.store
        .get(episode_id)
        .ok_or_else(|| Error::NotFound(format!("episode {episode_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> SubmitStateRequest {
        SubmitStateRequest {
            code: "x = 1\n".into(),
            cursor: Cursor { line: 1, column: 0 },
            action: None,
            target_line: None,
        }
    }

    #[test]
    fn zero_cursor_line_rejected() {
        let mut req = base_request();
        req.cursor.line = 0;
        assert!(matches!(
            validate_request(&req),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn action_without_target_line_rejected() {
        let mut req = base_request();
        req.action = Some(Action::FillPartialLine);
        assert!(matches!(
            validate_request(&req),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn target_line_without_action_rejected() {
        let mut req = base_request();
        req.target_line = Some(3);
        assert!(matches!(
            validate_request(&req),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_target_line_rejected() {
        let mut req = base_request();
        req.action = Some(Action::FillPartialLine);
        req.target_line = Some(0);
        assert!(matches!(
            validate_request(&req),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn oversized_code_rejected() {
        let mut req = base_request();
        req.code = "x".repeat(MAX_CODE_BYTES + 1);
        assert!(matches!(
            validate_request(&req),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn wellformed_request_accepted() {
        assert!(validate_request(&base_request()).is_ok());
        let mut explicit = base_request();
        explicit.action = Some(Action::EditExistingLines);
        explicit.target_line = Some(1);
        assert!(validate_request(&explicit).is_ok());
    }
}
