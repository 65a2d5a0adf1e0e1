use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Line diff
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One line-level edit operation.
///
/// Line numbers are 1-based. `old_line` indexes the pre-edit snapshot,
/// `new_line` the post-edit snapshot. Ops appear in aligned walk order, so
/// replaying them against the old code reproduces the new code exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DiffOp {
    /// The line is unchanged; it moves from `old_line` to `new_line`.
    Keep { old_line: u32, new_line: u32 },
    /// A new line at `new_line`. `provisional` marks an insert at or past
    /// the live stream seam — the only kind of decision a later diff
    /// revision may revise.
    Insert {
        new_line: u32,
        text: String,
        provisional: bool,
    },
    /// The line at `old_line` no longer exists.
    Delete { old_line: u32 },
}

/// An editor-appliable diff between two code snapshots. Immutable once
/// attached to a state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub ops: Vec<DiffOp>,
}

impl Diff {
    /// The identity diff over `line_count` lines (everything kept).
    pub fn identity(line_count: u32) -> Self {
        let ops = (1..=line_count)
            .map(|n| DiffOp::Keep {
                old_line: n,
                new_line: n,
            })
            .collect();
        Self { ops }
    }

    /// True when no line was inserted or deleted.
    pub fn is_identity(&self) -> bool {
        self.ops
            .iter()
            .all(|op| matches!(op, DiffOp::Keep { .. }))
    }

    /// Number of lines in the post-edit snapshot.
    pub fn new_line_count(&self) -> u32 {
        self.ops
            .iter()
            .filter(|op| !matches!(op, DiffOp::Delete { .. }))
            .count() as u32
    }

    /// Iterate inserted lines as `(new_line, text)`.
    pub fn inserted_lines(&self) -> impl Iterator<Item = (u32, &str)> {
        self.ops.iter().filter_map(|op| match op {
            DiffOp::Insert { new_line, text, .. } => Some((*new_line, text.as_str())),
            _ => None,
        })
    }

    /// True if any op is still provisional.
    pub fn has_provisional(&self) -> bool {
        self.ops.iter().any(|op| {
            matches!(
                op,
                DiffOp::Insert {
                    provisional: true,
                    ..
                }
            )
        })
    }

    /// Strip provisional markers — called when a stream ends and the trailing
    /// line can no longer grow.
    pub fn finalize(mut self) -> Self {
        for op in &mut self.ops {
            if let DiffOp::Insert { provisional, .. } = op {
                *provisional = false;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_diff_keeps_every_line() {
        let d = Diff::identity(3);
        assert!(d.is_identity());
        assert_eq!(d.new_line_count(), 3);
        assert_eq!(d.inserted_lines().count(), 0);
    }

    #[test]
    fn finalize_clears_provisional() {
        let d = Diff {
            ops: vec![DiffOp::Insert {
                new_line: 1,
                text: "partial".into(),
                provisional: true,
            }],
        };
        assert!(d.has_provisional());
        let d = d.finalize();
        assert!(!d.has_provisional());
    }

    #[test]
    fn new_line_count_excludes_deletes() {
        let d = Diff {
            ops: vec![
                DiffOp::Delete { old_line: 1 },
                DiffOp::Insert {
                    new_line: 1,
                    text: "x".into(),
                    provisional: false,
                },
                DiffOp::Keep {
                    old_line: 2,
                    new_line: 2,
                },
            ],
        };
        assert_eq!(d.new_line_count(), 2);
    }
}
