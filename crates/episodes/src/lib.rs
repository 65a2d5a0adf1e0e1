//! Durable episode storage for the CodeAssist state service.
//!
//! Episodes live in an append-only JSONL event log (one file per episode)
//! mirrored by an in-memory snapshot for fast reads. The snapshot is rebuilt
//! by replaying the logs on startup, so the log is the source of truth.
//! Also hosts the problem library: dataset entry-point metadata used to
//! synthesize test harnesses.

pub mod log;
pub mod problems;
pub mod store;

pub use log::{EpisodeLog, LogRecord};
pub use problems::{Problem, ProblemLibrary, TestCase};
pub use store::EpisodeStore;
