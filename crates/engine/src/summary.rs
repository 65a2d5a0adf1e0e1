//! Episode summary statistics.
//!
//! A pure fold over an episode's ordered states: per-action counts split by
//! who initiated them, compile/test regression and progression rates across
//! consecutive validated states, and inter-state latency percentiles.

use std::collections::BTreeMap;

use serde::Serialize;

use ca_domain::action::{Action, ActionSource};
use ca_domain::episode::Episode;

/// Aggregate view of one episode, suitable for the summary endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeSummary {
    pub total_states: usize,
    pub assistant_actions: BTreeMap<Action, u32>,
    pub human_actions: BTreeMap<Action, u32>,
    /// Final validated state compiled and passed at least one test.
    pub success: bool,
    /// Index of the first state that compiled with a passing test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turns_to_pass: Option<usize>,
    pub test_regression_rate: f64,
    pub test_progression_rate: f64,
    pub compile_regression_rate: f64,
    pub compile_progression_rate: f64,
    pub p50_latency_ms: u64,
    pub p90_latency_ms: u64,
    pub p99_latency_ms: u64,
}

/// Summarize an episode from its stored states.
pub fn summarize(episode: &Episode) -> EpisodeSummary {
    let mut assistant_actions: BTreeMap<Action, u32> = BTreeMap::new();
    let mut human_actions: BTreeMap<Action, u32> = BTreeMap::new();
    for state in &episode.states {
        let bucket = match state.action_source {
            ActionSource::Assistant => &mut assistant_actions,
            ActionSource::Human => &mut human_actions,
        };
        *bucket.entry(state.action).or_insert(0) += 1;
    }

    let (success, turns_to_pass) = pass_metrics(episode);
    let rates = transition_rates(episode);
    let (p50, p90, p99) = latency_percentiles(episode);

    EpisodeSummary {
        total_states: episode.states.len(),
        assistant_actions,
        human_actions,
        success,
        turns_to_pass,
        test_regression_rate: rates.test_regressions,
        test_progression_rate: rates.test_progressions,
        compile_regression_rate: rates.compile_regressions,
        compile_progression_rate: rates.compile_progressions,
        p50_latency_ms: p50,
        p90_latency_ms: p90,
        p99_latency_ms: p99,
    }
}

fn pass_metrics(episode: &Episode) -> (bool, Option<usize>) {
    let success = episode
        .last_state()
        .and_then(|s| s.env.as_ref())
        .map(|env| env.compiled && env.passed() > 0)
        .unwrap_or(false);

    let turns_to_pass = episode.states.iter().position(|s| {
        s.env
            .as_ref()
            .map(|env| env.compiled && env.passed() > 0)
            .unwrap_or(false)
    });

    (success, turns_to_pass)
}

struct TransitionRates {
    test_regressions: f64,
    test_progressions: f64,
    compile_regressions: f64,
    compile_progressions: f64,
}

/// Rates over consecutive state pairs where both carry an env block.
/// Unvalidated states contribute nothing.
fn transition_rates(episode: &Episode) -> TransitionRates {
    let mut test_reg = 0u32;
    let mut test_prog = 0u32;
    let mut compile_reg = 0u32;
    let mut compile_prog = 0u32;
    let mut transitions = 0u32;

    for pair in episode.states.windows(2) {
        let (Some(prev), Some(curr)) = (pair[0].env.as_ref(), pair[1].env.as_ref()) else {
            continue;
        };
        transitions += 1;

        if prev.compiled && !curr.compiled {
            compile_reg += 1;
        } else if !prev.compiled && curr.compiled {
            compile_prog += 1;
        }

        let prev_passed = prev.passed();
        let curr_passed = curr.passed();
        if curr_passed < prev_passed {
            test_reg += 1;
        } else if curr_passed > prev_passed {
            test_prog += 1;
        }
    }

    let denom = transitions.max(1) as f64;
    TransitionRates {
        test_regressions: test_reg as f64 / denom,
        test_progressions: test_prog as f64 / denom,
        compile_regressions: compile_reg as f64 / denom,
        compile_progressions: compile_prog as f64 / denom,
    }
}

fn latency_percentiles(episode: &Episode) -> (u64, u64, u64) {
    let mut latencies: Vec<u64> = episode
        .states
        .windows(2)
        .filter_map(|pair| {
            let delta = pair[1]
                .timestamp
                .signed_duration_since(pair[0].timestamp)
                .num_milliseconds();
            (delta > 0).then_some(delta as u64)
        })
        .collect();

    if latencies.is_empty() {
        return (0, 0, 0);
    }
    latencies.sort_unstable();
    let n = latencies.len();
    let pick = |p: f64| latencies[((n as f64 * p) as usize).min(n - 1)];
    (pick(0.5), pick(0.9), pick(0.99))
}
