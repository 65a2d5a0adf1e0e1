//! Shared domain types for the CodeAssist state service.
//!
//! Everything here is plain data: episodes and their states, the edit action
//! vocabulary, line diffs with per-line attribution, completion stream events,
//! the error taxonomy, and configuration. No I/O lives in this crate.

pub mod action;
pub mod config;
pub mod diff;
pub mod episode;
pub mod error;
pub mod stream;

pub use action::{Action, ActionSource};
pub use diff::{Diff, DiffOp};
pub use episode::{
    AttributionMap, Cursor, Environment, Episode, EpisodeStatus, LineOrigin, State, TestOutcome,
};
pub use error::{Error, Result};
