//! Pure algorithms of the CodeAssist orchestration core.
//!
//! Deterministic functions over domain types: FIM prompt construction,
//! line diffing (one-shot and incremental), cumulative per-line attribution,
//! and episode summary statistics. No I/O, no clocks, no randomness.

pub mod attribution;
pub mod diff;
pub mod fim;
pub mod summary;

pub use attribution::{
    advance_attribution, apply_diff_attribution, covers_snapshot, fold_attribution,
};
pub use diff::{apply_diff, compute_diff, StreamingDiff};
pub use fim::{build_fim_prompt, FimPrompt};
pub use summary::{summarize, EpisodeSummary};
