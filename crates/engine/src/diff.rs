//! Line-level diffing.
//!
//! [`compute_diff`] is the one-shot comparison used when a full post-edit
//! snapshot is available. [`StreamingDiff`] re-derives the diff as a
//! completion streams in: it keeps a committed prefix of finalized ops and
//! only re-runs the comparison over the uncommitted remainder, so a later
//! revision can never retract a line decided by an earlier one — only
//! provisional inserts (at or past the stream seam) are revisable.

use ca_domain::diff::{Diff, DiffOp};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// One-shot diff
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compute the aligned line diff between two snapshots.
pub fn compute_diff(old: &str, new: &str) -> Diff {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    Diff {
        ops: diff_ops(&old_lines, &new_lines, 0, 0),
    }
}

/// Apply a diff to the code it was computed against, reproducing the
/// post-edit snapshot. Inverse of [`compute_diff`] up to a trailing newline.
pub fn apply_diff(code: &str, diff: &Diff) -> String {
    let old_lines: Vec<&str> = code.lines().collect();
    let mut out = String::new();
    for op in &diff.ops {
        match op {
            DiffOp::Keep { old_line, .. } => {
                if let Some(line) = old_lines.get((*old_line - 1) as usize) {
                    out.push_str(line);
                    out.push('\n');
                }
            }
            DiffOp::Insert { text, .. } => {
                out.push_str(text);
                out.push('\n');
            }
            DiffOp::Delete { .. } => {}
        }
    }
    out
}

/// LCS walk over `old` vs `new`, producing ops in aligned order. Line
/// numbers are offset by `old_off`/`new_off` (lines already consumed by a
/// committed prefix).
fn diff_ops(old: &[&str], new: &[&str], old_off: u32, new_off: u32) -> Vec<DiffOp> {
    let n = old.len();
    let m = new.len();

    // dp[i][j] = LCS length of old[i..] vs new[j..]
    let mut dp = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if old[i] == new[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0usize, 0usize);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(DiffOp::Keep {
                old_line: old_off + i as u32 + 1,
                new_line: new_off + j as u32 + 1,
            });
            i += 1;
            j += 1;
        } else if dp[i + 1][j] >= dp[i][j + 1] {
            ops.push(DiffOp::Delete {
                old_line: old_off + i as u32 + 1,
            });
            i += 1;
        } else {
            ops.push(DiffOp::Insert {
                new_line: new_off + j as u32 + 1,
                text: new[j].to_string(),
                provisional: false,
            });
            j += 1;
        }
    }
    for k in i..n {
        ops.push(DiffOp::Delete {
            old_line: old_off + k as u32 + 1,
        });
    }
    for k in j..m {
        ops.push(DiffOp::Insert {
            new_line: new_off + k as u32 + 1,
            text: new[k].to_string(),
            provisional: false,
        });
    }
    ops
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming diff
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Incremental diff against a fixed original snapshot.
///
/// Each [`StreamingDiff::revise`] call receives the full candidate snapshot
/// (prefix + streamed-text-so-far + suffix) and the *seam*: the 1-based
/// candidate line still receiving streamed text. Ops for candidate lines
/// strictly before the seam are committed — appended to an immutable prefix
/// and never recomputed. Inserts at or past the seam are returned with
/// `provisional: true`.
pub struct StreamingDiff {
    original: Vec<String>,
    committed: Vec<DiffOp>,
    /// Original lines consumed by the committed prefix.
    old_done: usize,
    /// Candidate lines consumed by the committed prefix.
    new_done: usize,
}

impl StreamingDiff {
    pub fn new(original: &str) -> Self {
        Self {
            original: original.lines().map(str::to_string).collect(),
            committed: Vec::new(),
            old_done: 0,
            new_done: 0,
        }
    }

    /// Re-derive the current best diff for `candidate`.
    pub fn revise(&mut self, candidate: &str, seam_line: u32) -> Diff {
        let cand: Vec<&str> = candidate.lines().collect();
        let old_tail: Vec<&str> = self.original[self.old_done.min(self.original.len())..]
            .iter()
            .map(String::as_str)
            .collect();
        let new_tail: Vec<&str> = cand[self.new_done.min(cand.len())..].to_vec();

        let tail = diff_ops(
            &old_tail,
            &new_tail,
            self.old_done as u32,
            self.new_done as u32,
        );

        // Commit keeps and inserts that land before the seam. A delete is
        // held back until a later *matched* line (Keep) bounds it: the
        // dropped original line might still match text that has not
        // streamed in yet, but it cannot match anything once a line after
        // it has been matched.
        enum Disposition {
            CommitKeep,
            CommitInsert,
            Hold,
            Stop,
        }

        let mut rest: Vec<DiffOp> = Vec::new();
        let mut pending_deletes: Vec<DiffOp> = Vec::new();
        let mut iter = tail.into_iter();
        for op in iter.by_ref() {
            let disposition = match &op {
                DiffOp::Keep { new_line, .. } if *new_line < seam_line => Disposition::CommitKeep,
                DiffOp::Insert { new_line, .. } if *new_line < seam_line => {
                    Disposition::CommitInsert
                }
                DiffOp::Delete { .. } => Disposition::Hold,
                _ => Disposition::Stop,
            };
            match disposition {
                Disposition::CommitKeep => {
                    for del in pending_deletes.drain(..) {
                        self.old_done += 1;
                        self.committed.push(del);
                    }
                    self.old_done += 1;
                    self.new_done += 1;
                    self.committed.push(op);
                }
                Disposition::CommitInsert => {
                    self.new_done += 1;
                    self.committed.push(op);
                }
                Disposition::Hold => pending_deletes.push(op),
                Disposition::Stop => {
                    rest.push(op);
                    break;
                }
            }
        }
        let mut uncommitted = pending_deletes;
        uncommitted.append(&mut rest);
        uncommitted.extend(iter);

        let mut ops = self.committed.clone();
        for op in uncommitted {
            ops.push(match op {
                DiffOp::Insert {
                    new_line, text, ..
                } => DiffOp::Insert {
                    new_line,
                    text,
                    provisional: true,
                },
                other => other,
            });
        }
        Diff { ops }
    }

    /// Final revision once the stream has ended (cleanly or not): every
    /// decision commits and nothing remains provisional.
    pub fn finalize(&mut self, candidate: &str) -> Diff {
        self.revise(candidate, u32::MAX)
    }
}
