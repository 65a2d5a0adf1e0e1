use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Edit actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The edit action vocabulary shared with the policy service.
///
/// Each action targets a single 1-based line; what happens to that line
/// (and the lines after it) depends on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Do nothing this step.
    NoOp,
    /// Complete the remainder of a partially-typed line.
    FillPartialLine,
    /// Replace the target line and append a single new line.
    ReplaceAndAppendSingleLine,
    /// Replace the target line and append multiple new lines.
    ReplaceAndAppendMultiLine,
    /// Rewrite existing lines in place.
    EditExistingLines,
    /// Explain a single line (inserts a comment above it).
    ExplainSingleLines,
    /// Explain a multi-line region (inserts a comment block above it).
    ExplainMultiLine,
}

impl Action {
    /// Whether this action feeds the target line itself into the infill
    /// region. Fill/replace/edit actions rewrite the target line; explain
    /// actions insert *before* it and leave it untouched.
    pub fn consumes_target_line(self) -> bool {
        matches!(
            self,
            Action::FillPartialLine
                | Action::ReplaceAndAppendSingleLine
                | Action::ReplaceAndAppendMultiLine
                | Action::EditExistingLines
        )
    }

    /// Whether this action requires a completion from the model backend.
    /// `NoOp` short-circuits the pipeline with an identity diff.
    pub fn needs_completion(self) -> bool {
        !matches!(self, Action::NoOp)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::NoOp => "no_op",
            Action::FillPartialLine => "fill_partial_line",
            Action::ReplaceAndAppendSingleLine => "replace_and_append_single_line",
            Action::ReplaceAndAppendMultiLine => "replace_and_append_multi_line",
            Action::EditExistingLines => "edit_existing_lines",
            Action::ExplainSingleLines => "explain_single_lines",
            Action::ExplainMultiLine => "explain_multi_line",
        };
        f.write_str(s)
    }
}

/// Who initiated the action for a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    Human,
    Assistant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_snake_case_roundtrip() {
        let json = serde_json::to_string(&Action::ReplaceAndAppendMultiLine).unwrap();
        assert_eq!(json, r#""replace_and_append_multi_line""#);
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Action::ReplaceAndAppendMultiLine);
    }

    #[test]
    fn explain_actions_do_not_consume_target() {
        assert!(!Action::ExplainSingleLines.consumes_target_line());
        assert!(!Action::ExplainMultiLine.consumes_target_line());
        assert!(Action::EditExistingLines.consumes_target_line());
    }

    #[test]
    fn no_op_skips_completion() {
        assert!(!Action::NoOp.needs_completion());
        assert!(Action::FillPartialLine.needs_completion());
    }
}
