//! The CodeAssist state service.
//!
//! `codeassistd` orchestrates edit episodes for the editor front end: action
//! selection (explicit or via the policy service), FIM prompt construction,
//! streaming completion-to-diff assembly with per-line attribution, durable
//! episode storage, and a bounded background worker pool that validates
//! ended episodes against the test-execution service.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
