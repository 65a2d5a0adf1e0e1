//! The episode store.
//!
//! Owns every episode record. Mutations append to the durable log first and
//! only then touch the in-memory snapshot, so an acknowledged write is
//! always recoverable. Mutation of a given episode is serialized by callers
//! (the gateway holds a per-episode lock across the live path); the store
//! additionally holds its write lock across the log append so the snapshot
//! can never lead the log.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use ca_domain::episode::{Environment, Episode, EpisodeStatus, State};
use ca_domain::error::{Error, Result};

use crate::log::{EpisodeLog, LogRecord};

pub struct EpisodeStore {
    log: EpisodeLog,
    episodes: RwLock<HashMap<Uuid, Episode>>,
}

impl EpisodeStore {
    /// Open the store at `state_path/episodes`, replaying existing logs
    /// into the snapshot.
    pub fn open(state_path: &Path) -> Result<Self> {
        let log = EpisodeLog::new(&state_path.join("episodes"))?;

        let mut episodes = HashMap::new();
        for (id, records) in log.replay_all()? {
            match replay_episode(records) {
                Some(episode) => {
                    episodes.insert(id, episode);
                }
                None => {
                    tracing::warn!(episode_id = %id, "log has no creation record, skipping");
                }
            }
        }

        tracing::info!(
            episodes = episodes.len(),
            path = %state_path.join("episodes").display(),
            "episode store loaded"
        );

        Ok(Self {
            log,
            episodes: RwLock::new(episodes),
        })
    }

    /// Start a new active episode.
    pub fn create(&self, problem_id: &str) -> Result<Episode> {
        let episode = Episode::new(problem_id.to_owned());

        let mut episodes = self.episodes.write();
        self.log.append(
            episode.id,
            &LogRecord::Created {
                id: episode.id,
                problem_id: episode.problem_id.clone(),
                created_at: episode.created_at,
            },
        )?;
        episodes.insert(episode.id, episode.clone());

        tracing::info!(episode_id = %episode.id, problem_id = %episode.problem_id, "episode created");
        Ok(episode)
    }

    pub fn get(&self, id: Uuid) -> Option<Episode> {
        self.episodes.read().get(&id).cloned()
    }

    /// All episodes, newest first.
    pub fn list(&self) -> Vec<Episode> {
        let mut all: Vec<Episode> = self.episodes.read().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Append a state to an active episode. Returns the stored state.
    pub fn append_state(&self, id: Uuid, state: State) -> Result<State> {
        let mut episodes = self.episodes.write();
        let episode = episodes
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("episode {id}")))?;

        if !episode.status.accepts_states() {
            return Err(Error::InvalidTransition(format!(
                "episode {id} is {}, not active",
                episode.status
            )));
        }

        self.log.append(
            id,
            &LogRecord::StateAppended {
                state: state.clone(),
            },
        )?;
        episode.states.push(state.clone());

        tracing::debug!(
            episode_id = %id,
            state_index = episode.states.len() - 1,
            "state appended"
        );
        Ok(state)
    }

    /// Transition `Active → Ended`.
    pub fn end(&self, id: Uuid) -> Result<Episode> {
        let mut episodes = self.episodes.write();
        let episode = episodes
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("episode {id}")))?;

        if episode.status != EpisodeStatus::Active {
            return Err(Error::InvalidTransition(format!(
                "episode {id} is {}, cannot end",
                episode.status
            )));
        }

        let ended_at = Utc::now();
        self.log.append(id, &LogRecord::Ended { ended_at })?;
        episode.status = EpisodeStatus::Ended;
        episode.ended_at = Some(ended_at);

        tracing::info!(episode_id = %id, states = episode.states.len(), "episode ended");
        Ok(episode.clone())
    }

    /// Transition `Ended → TestsPending` when a validation job is enqueued.
    pub fn mark_tests_pending(&self, id: Uuid) -> Result<()> {
        let mut episodes = self.episodes.write();
        let episode = episodes
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("episode {id}")))?;

        match episode.status {
            EpisodeStatus::Ended => {}
            // Re-enqueue after a failed job: already pending, nothing to log.
            EpisodeStatus::TestsPending => return Ok(()),
            other => {
                return Err(Error::InvalidTransition(format!(
                    "episode {id} is {other}, cannot queue tests"
                )));
            }
        }

        self.log.append(id, &LogRecord::TestsPending)?;
        episode.status = EpisodeStatus::TestsPending;
        Ok(())
    }

    /// Attach a validation result to one state, out of band.
    ///
    /// Idempotent: re-applying an identical environment is a no-op.
    /// Applying a *different* environment to an already-validated state is
    /// rejected — appended history is immutable.
    pub fn attach_test_result(
        &self,
        id: Uuid,
        state_index: usize,
        env: Environment,
    ) -> Result<()> {
        let mut episodes = self.episodes.write();
        let episode = episodes
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("episode {id}")))?;
        let state = episode.states.get_mut(state_index).ok_or_else(|| {
            Error::NotFound(format!("episode {id} state {state_index}"))
        })?;

        match &state.env {
            Some(existing) if *existing == env => return Ok(()),
            Some(_) => {
                return Err(Error::InvalidTransition(format!(
                    "episode {id} state {state_index} already validated"
                )));
            }
            None => {}
        }

        self.log.append(
            id,
            &LogRecord::TestResult {
                state_index,
                env: env.clone(),
            },
        )?;
        state.env = Some(env);

        tracing::debug!(episode_id = %id, state_index, "test result attached");
        Ok(())
    }

    /// Transition `TestsPending → TestsComplete`. Requires every state to
    /// carry an env block — the orchestrator calls this only after a fully
    /// merged job.
    pub fn mark_tests_complete(&self, id: Uuid) -> Result<Episode> {
        let mut episodes = self.episodes.write();
        let episode = episodes
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("episode {id}")))?;

        if episode.status != EpisodeStatus::TestsPending {
            return Err(Error::InvalidTransition(format!(
                "episode {id} is {}, cannot complete tests",
                episode.status
            )));
        }
        if !episode.fully_validated() {
            return Err(Error::InvalidTransition(format!(
                "episode {id} has unvalidated states"
            )));
        }

        self.log.append(id, &LogRecord::TestsComplete)?;
        episode.status = EpisodeStatus::TestsComplete;

        tracing::info!(episode_id = %id, "tests complete");
        Ok(episode.clone())
    }
}

/// Rebuild an episode from its ordered log records. `None` if the log never
/// recorded a creation event.
fn replay_episode(records: Vec<LogRecord>) -> Option<Episode> {
    let mut episode: Option<Episode> = None;
    for record in records {
        match record {
            LogRecord::Created {
                id,
                problem_id,
                created_at,
            } => {
                episode = Some(Episode {
                    id,
                    problem_id,
                    status: EpisodeStatus::Active,
                    states: Vec::new(),
                    created_at,
                    ended_at: None,
                });
            }
            LogRecord::StateAppended { state } => {
                if let Some(ep) = episode.as_mut() {
                    ep.states.push(state);
                }
            }
            LogRecord::Ended { ended_at } => {
                if let Some(ep) = episode.as_mut() {
                    ep.status = EpisodeStatus::Ended;
                    ep.ended_at = Some(ended_at);
                }
            }
            LogRecord::TestsPending => {
                if let Some(ep) = episode.as_mut() {
                    ep.status = EpisodeStatus::TestsPending;
                }
            }
            LogRecord::TestResult { state_index, env } => {
                if let Some(state) =
                    episode.as_mut().and_then(|ep| ep.states.get_mut(state_index))
                {
                    state.env = Some(env);
                }
            }
            LogRecord::TestsComplete => {
                if let Some(ep) = episode.as_mut() {
                    ep.status = EpisodeStatus::TestsComplete;
                }
            }
        }
    }
    episode
}
