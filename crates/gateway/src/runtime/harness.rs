//! Stdin test-harness synthesis.
//!
//! The test-execution service runs submitted code with a harness that reads
//! one JSON argument per stdin line, calls the problem's entry point, and
//! prints the JSON result. Cases are passed alongside as input/expected
//! pairs; the tester compares stdout against `expected`.

use ca_clients::TesterCase;
use ca_episodes::Problem;

/// Render the stdin harness for a problem's entry point.
pub fn synthesize_harness(problem: &Problem) -> String {
    format!(
        r#"import sys
import json

from solution import {entry}


def _main():
    lines = [line for line in sys.stdin.read().splitlines() if line.strip()]
    args = [json.loads(line) for line in lines]
    result = {entry}(*args)
    if result is not None:
        print(json.dumps(result))


if __name__ == "__main__":
    _main()
"#,
        entry = problem.entry_point
    )
}

/// Convert a problem's dataset cases into tester wire cases, named by
/// position so outcomes stay ordered and addressable.
pub fn tester_cases(problem: &Problem) -> Vec<TesterCase> {
    problem
        .cases
        .iter()
        .enumerate()
        .map(|(i, c)| TesterCase {
            name: format!("case_{i}"),
            input: c.input.clone(),
            expected: c.expected.clone(),
        })
        .collect()
}
