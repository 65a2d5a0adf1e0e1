//! Append-only JSONL episode logs.
//!
//! Each episode gets an `<episodeId>.jsonl` file under the episodes
//! directory. Every lifecycle event is appended as a single JSON line and
//! fsynced before the call returns — the in-memory snapshot never leads the
//! log. Replaying a log file reconstructs the episode exactly.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ca_domain::episode::{Environment, State};
use ca_domain::error::{Error, Result};

/// One durable episode event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogRecord {
    Created {
        id: Uuid,
        problem_id: String,
        created_at: DateTime<Utc>,
    },
    StateAppended {
        state: State,
    },
    Ended {
        ended_at: DateTime<Utc>,
    },
    TestsPending,
    /// Out-of-band result patch from the test orchestrator.
    TestResult {
        state_index: usize,
        env: Environment,
    },
    TestsComplete,
}

/// Writes and replays per-episode JSONL logs.
pub struct EpisodeLog {
    base_dir: PathBuf,
}

impl EpisodeLog {
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(Error::Io)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.base_dir.join(format!("{id}.jsonl"))
    }

    /// Append one record and fsync before returning. Durability before
    /// acknowledgment: callers may only update their snapshot after this
    /// succeeds.
    pub fn append(&self, id: Uuid, record: &LogRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(id))
            .map_err(Error::Io)?;
        file.write_all(json.as_bytes()).map_err(Error::Io)?;
        file.write_all(b"\n").map_err(Error::Io)?;
        file.sync_data().map_err(Error::Io)?;
        Ok(())
    }

    /// Read back one episode's records. Malformed lines are skipped with a
    /// warning rather than poisoning the whole episode.
    pub fn read(&self, id: Uuid) -> Result<Vec<LogRecord>> {
        read_jsonl_file(&self.path_for(id), id)
    }

    /// Replay every log file in the directory, in no particular episode
    /// order (records within an episode stay ordered).
    pub fn replay_all(&self) -> Result<Vec<(Uuid, Vec<LogRecord>)>> {
        let mut out = Vec::new();
        let entries = std::fs::read_dir(&self.base_dir).map_err(Error::Io)?;
        for entry in entries {
            let entry = entry.map_err(Error::Io)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                tracing::warn!(path = %path.display(), "skipping non-episode file in log dir");
                continue;
            };
            out.push((id, read_jsonl_file(&path, id)?));
        }
        Ok(out)
    }
}

fn read_jsonl_file(path: &Path, id: Uuid) -> Result<Vec<LogRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    let mut records = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(line) {
            Ok(rec) => records.push(rec),
            Err(e) => {
                tracing::warn!(
                    episode_id = %id,
                    error = %e,
                    "skipping malformed episode log line"
                );
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let log = EpisodeLog::new(dir.path()).unwrap();
        let id = Uuid::new_v4();

        log.append(
            id,
            &LogRecord::Created {
                id,
                problem_id: "two-sum".into(),
                created_at: Utc::now(),
            },
        )
        .unwrap();
        log.append(id, &LogRecord::TestsPending).unwrap();

        let records = log.read(id).unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], LogRecord::Created { .. }));
        assert!(matches!(records[1], LogRecord::TestsPending));
    }

    #[test]
    fn read_missing_episode_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = EpisodeLog::new(dir.path()).unwrap();
        assert!(log.read(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = EpisodeLog::new(dir.path()).unwrap();
        let id = Uuid::new_v4();
        log.append(id, &LogRecord::TestsPending).unwrap();

        // Corrupt the file with a half-written line.
        let path = dir.path().join(format!("{id}.jsonl"));
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"event\":\"trunc");
        std::fs::write(&path, raw).unwrap();

        let records = log.read(id).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn replay_all_finds_every_episode() {
        let dir = tempfile::tempdir().unwrap();
        let log = EpisodeLog::new(dir.path()).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        log.append(a, &LogRecord::TestsPending).unwrap();
        log.append(b, &LogRecord::TestsPending).unwrap();
        // A stray file should be ignored.
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();

        let replayed = log.replay_all().unwrap();
        assert_eq!(replayed.len(), 2);
        assert!(replayed.iter().any(|(id, _)| *id == a));
        assert!(replayed.iter().any(|(id, _)| *id == b));
    }
}
