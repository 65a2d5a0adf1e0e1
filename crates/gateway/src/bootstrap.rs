//! AppState construction — the shared "boot" path.
//!
//! Validates the config, initializes every subsystem, and returns a fully
//! wired [`AppState`] with the test orchestrator already running.

use std::sync::Arc;

use anyhow::Context;

use ca_clients::{HttpCompletionClient, HttpPolicyClient, HttpTesterClient};
use ca_domain::config::{Config, ConfigSeverity};
use ca_episodes::{EpisodeStore, ProblemLibrary};

use crate::api::auth::token_hash_from_env;
use crate::runtime::episode_lock::EpisodeLockMap;
use crate::runtime::testjobs::TestOrchestrator;
use crate::state::AppState;

pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Episode store ────────────────────────────────────────────────
    let store = Arc::new(
        EpisodeStore::open(&config.store.state_path).context("opening episode store")?,
    );

    // ── Problem library ──────────────────────────────────────────────
    let problems = Arc::new(
        ProblemLibrary::load(&config.store.state_path).context("loading problem library")?,
    );

    // ── Remote collaborators ─────────────────────────────────────────
    let policy = Arc::new(
        HttpPolicyClient::from_config(&config.policy).context("building policy client")?,
    );
    tracing::info!(url = %config.policy.base_url, "policy client ready");

    let completion = Arc::new(
        HttpCompletionClient::from_config(&config.completion)
            .context("building completion client")?,
    );
    tracing::info!(
        url = %config.completion.base_url,
        model = %config.completion.model,
        "completion client ready"
    );

    let tester = Arc::new(
        HttpTesterClient::from_config(&config.tester).context("building tester client")?,
    );
    tracing::info!(url = %config.tester.base_url, "tester client ready");

    // ── Test orchestrator (background worker pool) ───────────────────
    let orchestrator = TestOrchestrator::start(
        &config.jobs,
        config.tester.clone(),
        store.clone(),
        problems.clone(),
        tester,
    );

    // ── Episode locks (per-episode live-path serialization) ──────────
    let episode_locks = Arc::new(EpisodeLockMap::new());

    // ── API token (read once, hash for constant-time comparison) ─────
    let api_token_hash = token_hash_from_env(&config.server.api_token_env);

    Ok(AppState {
        config,
        store,
        problems,
        policy,
        completion,
        orchestrator,
        episode_locks,
        api_token_hash,
    })
}
