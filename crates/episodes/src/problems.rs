//! Problem library — dataset metadata for test-harness synthesis.
//!
//! `problems.json` maps problem IDs to the entry point the harness should
//! call and the stdin/stdout cases the tester service runs. A missing file
//! is tolerated (episodes can still be recorded; validation jobs for
//! unknown problems fail cleanly).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use ca_domain::error::{Error, Result};

/// One stdin/stdout test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected: String,
}

/// Dataset entry for one problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub problem_id: String,
    /// Numeric dataset ID, when the source dataset assigns one.
    #[serde(default)]
    pub question_id: Option<u32>,
    /// Function the synthesized harness calls with each case's input.
    pub entry_point: String,
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

/// Read-only in-memory problem set, loaded once at boot.
#[derive(Debug)]
pub struct ProblemLibrary {
    problems: HashMap<String, Problem>,
}

impl ProblemLibrary {
    /// Load `state_path/problems.json`. A missing file yields an empty
    /// library with a warning.
    pub fn load(state_path: &Path) -> Result<Self> {
        let path = state_path.join("problems.json");
        if !path.exists() {
            tracing::warn!(path = %path.display(), "problems.json not found, library is empty");
            return Ok(Self {
                problems: HashMap::new(),
            });
        }

        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        let list: Vec<Problem> = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let problems: HashMap<String, Problem> = list
            .into_iter()
            .map(|p| (p.problem_id.clone(), p))
            .collect();

        tracing::info!(problems = problems.len(), "problem library loaded");
        Ok(Self { problems })
    }

    pub fn get(&self, problem_id: &str) -> Option<&Problem> {
        self.problems.get(problem_id)
    }

    pub fn contains(&self, problem_id: &str) -> bool {
        self.problems.contains_key(problem_id)
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}
