//! Per-line provenance tracking.
//!
//! Attribution is cumulative across an episode: each state's map is derived
//! from the previous state's map pushed through that state's diffs, never
//! recomputed from raw text. Two diffs matter per step:
//!
//! 1. the *bridge* — whatever the human changed between the previous state's
//!    post-edit code and the newly submitted snapshot (attributed `Human`),
//! 2. the *produced* diff — lines the completion stream inserted
//!    (attributed `Assistant`).
//!
//! [`fold_attribution`] replays the whole episode with exactly these steps,
//! so the invariant — every line of the current snapshot has exactly one
//! origin — stays mechanically checkable against stored history.

use ca_domain::diff::{Diff, DiffOp};
use ca_domain::episode::{AttributionMap, LineOrigin, State};

use crate::diff::{apply_diff, compute_diff};

/// Push an attribution map through one diff.
///
/// Inserted lines take `inserted_origin`; kept lines carry their prior
/// origin across the renumbering. Lines with no prior record default to
/// `Human` — code that predates tracking is human-authored.
pub fn apply_diff_attribution(
    prev: &AttributionMap,
    diff: &Diff,
    inserted_origin: LineOrigin,
) -> AttributionMap {
    let mut next = AttributionMap::new();
    for op in &diff.ops {
        match op {
            DiffOp::Keep { old_line, new_line } => {
                let origin = prev.get(old_line).copied().unwrap_or(LineOrigin::Human);
                next.insert(*new_line, origin);
            }
            DiffOp::Insert { new_line, .. } => {
                next.insert(*new_line, inserted_origin);
            }
            DiffOp::Delete { .. } => {}
        }
    }
    next
}

/// Derive the next state's attribution the way the live pipeline does:
/// bridge the human drift from `prev_post_code` to `submitted_code`, then
/// apply the produced diff with assistant origin.
pub fn advance_attribution(
    prev: &AttributionMap,
    prev_post_code: &str,
    submitted_code: &str,
    produced: &Diff,
) -> AttributionMap {
    let bridge = compute_diff(prev_post_code, submitted_code);
    let bridged = apply_diff_attribution(prev, &bridge, LineOrigin::Human);
    apply_diff_attribution(&bridged, produced, LineOrigin::Assistant)
}

/// Replay attribution over an episode's ordered states from scratch.
///
/// Equals the last state's stored map when history is consistent; used by
/// tests and integrity checks.
pub fn fold_attribution<'a, I>(states: I) -> AttributionMap
where
    I: IntoIterator<Item = &'a State>,
{
    let mut map = AttributionMap::new();
    let mut prev_post = String::new();
    for state in states {
        map = advance_attribution(&map, &prev_post, &state.code, &state.diff);
        prev_post = apply_diff(&state.code, &state.diff);
    }
    map
}

/// Check the coverage invariant: the attributed line set is exactly
/// `1..=line_count`.
pub fn covers_snapshot(map: &AttributionMap, line_count: u32) -> bool {
    map.len() as u32 == line_count && map.keys().copied().eq(1..=line_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ca_domain::action::{Action, ActionSource};
    use ca_domain::episode::Cursor;

    fn state(code: &str, diff: Diff) -> State {
        State {
            code: code.into(),
            cursor: Cursor { line: 1, column: 0 },
            action: Action::EditExistingLines,
            action_source: ActionSource::Assistant,
            target_line: 1,
            diff,
            attribution: AttributionMap::new(),
            env: None,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn initial_snapshot_defaults_to_human() {
        let diff = compute_diff("", "a\nb\n");
        let map = apply_diff_attribution(&AttributionMap::new(), &diff, LineOrigin::Human);
        assert_eq!(map.get(&1), Some(&LineOrigin::Human));
        assert!(covers_snapshot(&map, 2));
    }

    #[test]
    fn inserted_lines_take_assistant_origin() {
        let prev: AttributionMap = [(1, LineOrigin::Human), (2, LineOrigin::Human)]
            .into_iter()
            .collect();
        let diff = compute_diff("a\nb\n", "a\nx\nb\n");
        let map = apply_diff_attribution(&prev, &diff, LineOrigin::Assistant);
        assert_eq!(map.get(&1), Some(&LineOrigin::Human));
        assert_eq!(map.get(&2), Some(&LineOrigin::Assistant));
        // "b" moved from line 2 to line 3 and kept its origin.
        assert_eq!(map.get(&3), Some(&LineOrigin::Human));
        assert!(covers_snapshot(&map, 3));
    }

    #[test]
    fn human_bridge_reclaims_reedited_lines() {
        // The assistant wrote line 1; the human then rewrote it between
        // states. The bridge attributes the rewrite to the human.
        let prev: AttributionMap = [(1, LineOrigin::Assistant)].into_iter().collect();
        let map = advance_attribution(
            &prev,
            "generated\n",
            "handwritten\n",
            &Diff::identity(1),
        );
        assert_eq!(map.get(&1), Some(&LineOrigin::Human));
    }

    #[test]
    fn untouched_assistant_lines_stay_assistant() {
        let prev: AttributionMap = [(1, LineOrigin::Assistant)].into_iter().collect();
        // No human drift; the stream appends a second line.
        let produced = compute_diff("gen\n", "gen\nmore\n");
        let map = advance_attribution(&prev, "gen\n", "gen\n", &produced);
        assert_eq!(map.get(&1), Some(&LineOrigin::Assistant));
        assert_eq!(map.get(&2), Some(&LineOrigin::Assistant));
    }

    #[test]
    fn fold_matches_stepwise_pipeline() {
        // Step 1: human arrives with one line, assistant appends one.
        let d1 = compute_diff("x = 0\n", "x = 0\ny = 1\n");
        let s1 = state("x = 0\n", d1);
        // Step 2: human leaves code alone, assistant appends another.
        let d2 = compute_diff("x = 0\ny = 1\n", "x = 0\ny = 1\nz = 2\n");
        let s2 = state("x = 0\ny = 1\n", d2);

        let folded = fold_attribution([&s1, &s2]);

        let step1 = advance_attribution(&AttributionMap::new(), "", &s1.code, &s1.diff);
        let post1 = apply_diff(&s1.code, &s1.diff);
        let step2 = advance_attribution(&step1, &post1, &s2.code, &s2.diff);

        assert_eq!(folded, step2);
        assert_eq!(folded.get(&1), Some(&LineOrigin::Human));
        assert_eq!(folded.get(&2), Some(&LineOrigin::Assistant));
        assert_eq!(folded.get(&3), Some(&LineOrigin::Assistant));
        assert!(covers_snapshot(&folded, 3));
    }

    #[test]
    fn coverage_rejects_gaps() {
        let mut map = AttributionMap::new();
        map.insert(1, LineOrigin::Human);
        map.insert(3, LineOrigin::Human);
        assert!(!covers_snapshot(&map, 3));
        assert!(!covers_snapshot(&map, 2));
    }
}
