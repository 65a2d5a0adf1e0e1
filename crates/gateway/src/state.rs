use std::sync::Arc;

use ca_clients::{CompletionClient, PolicyClient};
use ca_domain::config::Config;
use ca_episodes::{EpisodeStore, ProblemLibrary};

use crate::runtime::episode_lock::EpisodeLockMap;
use crate::runtime::testjobs::TestOrchestrator;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, episode store, problem library
/// - **Remote collaborators** — policy and completion clients
/// - **Background validation** — the test orchestrator
/// - **Concurrency & security** — per-episode locks, API token hash
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<EpisodeStore>,
    pub problems: Arc<ProblemLibrary>,

    // ── Remote collaborators ──────────────────────────────────────────
    pub policy: Arc<dyn PolicyClient>,
    pub completion: Arc<dyn CompletionClient>,

    // ── Background validation ─────────────────────────────────────────
    pub orchestrator: Arc<TestOrchestrator>,

    // ── Concurrency & security ────────────────────────────────────────
    /// Per-episode submit locks (one live request per episode at a time).
    pub episode_locks: Arc<EpisodeLockMap>,
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
