//! Fill-in-the-middle prompt construction.
//!
//! Splits a code snapshot into prefix/suffix around the action's target line
//! and renders the standard PSM (prefix-suffix-middle) wire format the
//! completion backend expects.

use ca_domain::action::Action;
use ca_domain::episode::Cursor;
use ca_domain::error::{Error, Result};

pub const FIM_PREFIX: &str = "<|fim_prefix|>";
pub const FIM_SUFFIX: &str = "<|fim_suffix|>";
pub const FIM_MIDDLE: &str = "<|fim_middle|>";

/// A formatted fill-in-the-middle prompt.
///
/// `prefix` and `suffix` hold raw source text; [`FimPrompt::render`]
/// produces the sentinel-delimited wire string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FimPrompt {
    pub prefix: String,
    pub suffix: String,
}

impl FimPrompt {
    /// Render the PSM wire format: the model generates after the middle
    /// sentinel, infilling between prefix and suffix.
    pub fn render(&self) -> String {
        format!(
            "{FIM_PREFIX}{}{FIM_SUFFIX}{}{FIM_MIDDLE}",
            self.prefix, self.suffix
        )
    }
}

/// Build the FIM prompt for one action.
///
/// The split point depends on the action:
/// - `FillPartialLine` keeps the target line up to the cursor column in the
///   prefix; the model completes the rest of the line.
/// - Replace/edit actions drop the target line from both sides; the model
///   rewrites it (plus any appended lines).
/// - Explain actions split directly before the target line, which stays in
///   the suffix untouched.
///
/// `target_line` is 1-based and must address an existing line (line 1 is
/// always valid, so an empty snapshot still accepts an insert).
pub fn build_fim_prompt(
    code: &str,
    cursor: Cursor,
    action: Action,
    target_line: u32,
) -> Result<FimPrompt> {
    let lines: Vec<&str> = code.lines().collect();
    let line_count = lines.len().max(1) as u32;

    if target_line == 0 || target_line > line_count {
        return Err(Error::InvalidArgument(format!(
            "target_line {target_line} out of bounds (1..={line_count})"
        )));
    }

    let t = (target_line - 1) as usize;

    let (prefix, suffix) = match action {
        Action::FillPartialLine => {
            let target = lines.get(t).copied().unwrap_or("");
            let col = (cursor.column as usize).min(target.len());
            let mut prefix = join_lines(&lines[..t]);
            prefix.push_str(&target[..col]);
            let suffix = trailing_lines(&lines[t + 1..]);
            (prefix, suffix)
        }
        a if a.consumes_target_line() => {
            let prefix = join_lines(&lines[..t]);
            let suffix = trailing_lines(lines.get(t + 1..).unwrap_or(&[]));
            (prefix, suffix)
        }
        _ => {
            // Insert before the target line; it survives in the suffix.
            let prefix = join_lines(&lines[..t]);
            let suffix = trailing_lines(lines.get(t..).unwrap_or(&[]));
            (prefix, suffix)
        }
    };

    Ok(FimPrompt { prefix, suffix })
}

/// Join lines with trailing newlines: `["a","b"]` → `"a\nb\n"`.
fn join_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Join lines with leading newlines: `["a","b"]` → `"\na\nb"`.
/// The infill region ends without a newline, so the suffix supplies it.
fn trailing_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push('\n');
        out.push_str(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: &str = "def add(a, b):\n    pass\n\nprint(add(1, 2))\n";

    fn cursor(line: u32, column: u32) -> Cursor {
        Cursor { line, column }
    }

    #[test]
    fn replace_excludes_target_from_both_sides() {
        let p = build_fim_prompt(CODE, cursor(2, 0), Action::EditExistingLines, 2).unwrap();
        assert_eq!(p.prefix, "def add(a, b):\n");
        assert_eq!(p.suffix, "\n\nprint(add(1, 2))");
    }

    #[test]
    fn explain_keeps_target_in_suffix() {
        let p = build_fim_prompt(CODE, cursor(2, 0), Action::ExplainSingleLines, 2).unwrap();
        assert_eq!(p.prefix, "def add(a, b):\n");
        assert!(p.suffix.starts_with("\n    pass"));
    }

    #[test]
    fn fill_partial_line_splits_at_cursor() {
        let p = build_fim_prompt(CODE, cursor(2, 7), Action::FillPartialLine, 2).unwrap();
        assert_eq!(p.prefix, "def add(a, b):\n    pas");
        assert_eq!(p.suffix, "\n\nprint(add(1, 2))");
    }

    #[test]
    fn fill_partial_clamps_cursor_past_line_end() {
        let p = build_fim_prompt(CODE, cursor(2, 999), Action::FillPartialLine, 2).unwrap();
        assert_eq!(p.prefix, "def add(a, b):\n    pass");
    }

    #[test]
    fn empty_code_accepts_line_one() {
        let p = build_fim_prompt("", cursor(1, 0), Action::ReplaceAndAppendSingleLine, 1).unwrap();
        assert_eq!(p.prefix, "");
        assert_eq!(p.suffix, "");
    }

    #[test]
    fn out_of_bounds_target_rejected() {
        let err = build_fim_prompt(CODE, cursor(1, 0), Action::NoOp, 5).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = build_fim_prompt(CODE, cursor(1, 0), Action::NoOp, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn render_is_deterministic() {
        let p = build_fim_prompt(CODE, cursor(2, 0), Action::EditExistingLines, 2).unwrap();
        let rendered = p.render();
        assert_eq!(rendered, p.render());
        assert!(rendered.starts_with(FIM_PREFIX));
        assert!(rendered.ends_with(FIM_MIDDLE));
        assert!(rendered.contains(FIM_SUFFIX));
    }
}
