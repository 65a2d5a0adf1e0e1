//! Test-execution-service adapter.
//!
//! One POST per validation: submitted code, the synthesized stdin harness,
//! and the problem's input/output cases go out; ordered per-case pass/fail
//! plus timing comes back. All failures map to the retryable
//! `TesterUnavailable` — retry policy (attempts, backoff) lives with the
//! orchestrator, not here.

use serde::{Deserialize, Serialize};

use ca_domain::config::TesterConfig;
use ca_domain::error::{Error, Result};

use crate::util::from_reqwest;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One stdin/stdout case to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesterCase {
    pub name: String,
    pub input: String,
    pub expected: String,
}

/// A full validation request for one code snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TesterRequest {
    pub code: String,
    /// Stdin harness wrapping the entry point (synthesized by the caller).
    pub harness: String,
    pub cases: Vec<TesterCase>,
}

/// Per-case verdict, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CaseOutcome {
    pub name: String,
    pub passed: bool,
    pub time_ms: u64,
}

/// The service's verdict for one request.
#[derive(Debug, Clone, Deserialize)]
pub struct TesterResponse {
    pub compiled: bool,
    #[serde(default)]
    pub results: Vec<CaseOutcome>,
    #[serde(default)]
    pub execution_time_ms: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait + HTTP impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Runs submitted code against a problem's test cases.
#[async_trait::async_trait]
pub trait TesterClient: Send + Sync {
    async fn run_tests(&self, req: TesterRequest) -> Result<TesterResponse>;
}

/// HTTP adapter for the remote test-execution service.
pub struct HttpTesterClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTesterClient {
    pub fn from_config(cfg: &TesterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl TesterClient for HttpTesterClient {
    async fn run_tests(&self, req: TesterRequest) -> Result<TesterResponse> {
        let url = format!("{}/v1/execute", self.base_url);
        let case_count = req.cases.len();

        let response = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::TesterUnavailable(from_reqwest(e).to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::TesterUnavailable(format!("HTTP {status}: {text}")));
        }

        let verdict: TesterResponse = response
            .json()
            .await
            .map_err(|e| Error::TesterUnavailable(format!("malformed response: {e}")))?;

        tracing::debug!(
            cases = case_count,
            compiled = verdict.compiled,
            passed = verdict.results.iter().filter(|r| r.passed).count(),
            "tester verdict"
        );
        Ok(verdict)
    }
}
