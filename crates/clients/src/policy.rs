//! Policy-service adapter — next-action selection.
//!
//! One synchronous POST per lookup: the current code/cursor context plus the
//! configured strategy options go out, a chosen action and 1-based target
//! line come back. Any failure (connect, timeout, non-2xx, malformed body)
//! surfaces as `PolicyUnavailable` — the caller decides what to do; nothing
//! is silently defaulted.

use serde::{Deserialize, Serialize};

use ca_domain::action::Action;
use ca_domain::config::PolicyConfig;
use ca_domain::episode::Cursor;
use ca_domain::error::{Error, Result};

use crate::util::from_reqwest;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
struct SelectRequest<'a> {
    code: &'a str,
    cursor_line: u32,
    cursor_column: u32,
    strategy: &'a str,
    top_k: u32,
    temperature: f32,
    epsilon: f32,
}

/// The policy service's choice: an action and the 1-based line to apply it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PolicyDecision {
    pub action: Action,
    pub line: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait + HTTP impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolves the next action for an episode step.
#[async_trait::async_trait]
pub trait PolicyClient: Send + Sync {
    async fn select_action(&self, code: &str, cursor: Cursor) -> Result<PolicyDecision>;
}

/// HTTP adapter for the remote policy service.
pub struct HttpPolicyClient {
    base_url: String,
    strategy: String,
    top_k: u32,
    temperature: f32,
    epsilon: f32,
    client: reqwest::Client,
}

impl HttpPolicyClient {
    pub fn from_config(cfg: &PolicyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            strategy: cfg.strategy.clone(),
            top_k: cfg.top_k,
            temperature: cfg.temperature,
            epsilon: cfg.epsilon,
            client,
        })
    }
}

#[async_trait::async_trait]
impl PolicyClient for HttpPolicyClient {
    async fn select_action(&self, code: &str, cursor: Cursor) -> Result<PolicyDecision> {
        let url = format!("{}/v1/policy/select", self.base_url);
        let body = SelectRequest {
            code,
            cursor_line: cursor.line,
            cursor_column: cursor.column,
            strategy: &self.strategy,
            top_k: self.top_k,
            temperature: self.temperature,
            epsilon: self.epsilon,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::PolicyUnavailable(from_reqwest(e).to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::PolicyUnavailable(format!(
                "HTTP {status}: {text}"
            )));
        }

        let decision: PolicyDecision = response
            .json()
            .await
            .map_err(|e| Error::PolicyUnavailable(format!("malformed response: {e}")))?;

        if decision.line == 0 {
            return Err(Error::PolicyUnavailable(
                "malformed response: line is 0 (lines are 1-based)".into(),
            ));
        }

        tracing::debug!(action = %decision.action, line = decision.line, "policy decision");
        Ok(decision)
    }
}
