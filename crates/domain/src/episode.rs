use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::{Action, ActionSource};
use crate::diff::Diff;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Episode lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where an episode sits in its lifecycle.
///
/// `Active → Ended → TestsPending → TestsComplete`, strictly forward. An
/// episode whose background validation failed stays `TestsPending` until a
/// retry succeeds — the service never fabricates a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Active,
    Ended,
    TestsPending,
    TestsComplete,
}

impl EpisodeStatus {
    /// Only active episodes accept new states.
    pub fn accepts_states(self) -> bool {
        matches!(self, EpisodeStatus::Active)
    }
}

impl std::fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EpisodeStatus::Active => "active",
            EpisodeStatus::Ended => "ended",
            EpisodeStatus::TestsPending => "tests_pending",
            EpisodeStatus::TestsComplete => "tests_complete",
        };
        f.write_str(s)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Attribution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-line provenance: who authored the line as it currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineOrigin {
    Human,
    Assistant,
}

/// Line number (1-based) → origin for every line of a code snapshot.
/// `BTreeMap` keeps iteration in line order.
pub type AttributionMap = BTreeMap<u32, LineOrigin>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Test environment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of a single test case, in dataset order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub passed: bool,
    pub time_ms: u64,
}

/// Result of validating one state's code against the test-execution
/// service. Attached to a state out of band, after the episode ends.
///
/// `None` on a state means validation has not completed; `Some` with an
/// empty `tests` list means it ran and found nothing to run — the two are
/// deliberately distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub compiled: bool,
    pub tests: Vec<TestOutcome>,
    pub execution_time_ms: u64,
}

impl Environment {
    /// Count of passing test cases.
    pub fn passed(&self) -> usize {
        self.tests.iter().filter(|t| t.passed).count()
    }

    /// Compiled and every test case passed (vacuously true on no cases).
    pub fn all_passed(&self) -> bool {
        self.compiled && self.tests.iter().all(|t| t.passed)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cursor / State / Episode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Editor cursor position. `line` is 1-based, `column` is a 0-based
/// character offset within the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub line: u32,
    pub column: u32,
}

/// One step within an episode: the code as it stood, the action taken, the
/// diff the assistant produced, and per-line attribution. Immutable once
/// appended — only the `env` block may be patched in later, exactly once
/// per distinct result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub code: String,
    pub cursor: Cursor,
    pub action: Action,
    pub action_source: ActionSource,
    /// 1-based line the action targeted.
    pub target_line: u32,
    pub diff: Diff,
    pub attribution: AttributionMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Environment>,
    pub timestamp: DateTime<Utc>,
}

/// One recorded edit session. States are strictly ordered: insertion order
/// is chronological is causal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    /// Dataset problem this episode works on.
    pub problem_id: String,
    pub status: EpisodeStatus,
    pub states: Vec<State>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Episode {
    pub fn new(problem_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            problem_id,
            status: EpisodeStatus::Active,
            states: Vec::new(),
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    /// The latest state, if any.
    pub fn last_state(&self) -> Option<&State> {
        self.states.last()
    }

    /// True once every state carries an env block (vacuously true for an
    /// episode with no states — there is nothing to validate).
    pub fn fully_validated(&self) -> bool {
        self.states.iter().all(|s| s.env.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&EpisodeStatus::TestsPending).unwrap();
        assert_eq!(json, r#""tests_pending""#);
    }

    #[test]
    fn only_active_accepts_states() {
        assert!(EpisodeStatus::Active.accepts_states());
        assert!(!EpisodeStatus::Ended.accepts_states());
        assert!(!EpisodeStatus::TestsPending.accepts_states());
        assert!(!EpisodeStatus::TestsComplete.accepts_states());
    }

    #[test]
    fn env_absent_vs_empty_are_distinct() {
        let ran_empty = Environment {
            compiled: true,
            tests: vec![],
            execution_time_ms: 5,
        };
        assert!(ran_empty.all_passed());
        assert_eq!(ran_empty.passed(), 0);

        // A state with env: None round-trips without an `env` key at all.
        let state = State {
            code: "x = 1\n".into(),
            cursor: Cursor { line: 1, column: 0 },
            action: Action::NoOp,
            action_source: ActionSource::Human,
            target_line: 1,
            diff: Diff::identity(1),
            attribution: AttributionMap::new(),
            env: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("env").is_none());
    }

    #[test]
    fn fully_validated_requires_every_state() {
        let mut ep = Episode::new("two-sum".into());
        // Vacuously validated while empty.
        assert!(ep.fully_validated());

        let mut s = State {
            code: String::new(),
            cursor: Cursor { line: 1, column: 0 },
            action: Action::NoOp,
            action_source: ActionSource::Human,
            target_line: 1,
            diff: Diff::default(),
            attribution: AttributionMap::new(),
            env: None,
            timestamp: Utc::now(),
        };
        ep.states.push(s.clone());
        assert!(!ep.fully_validated());

        s.env = Some(Environment {
            compiled: false,
            tests: vec![],
            execution_time_ms: 0,
        });
        ep.states[0] = s;
        assert!(ep.fully_validated());
    }
}
