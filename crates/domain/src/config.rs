//! Service configuration.
//!
//! Loaded from a TOML file (`codeassist.toml` by default). Every field has a
//! serde default so a partial — or empty — file is valid; `Config::validate`
//! reports issues with warning/error severity before the service boots.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Environment variable holding the API bearer token for protected
    /// endpoints. If the env var is set and non-empty, all API endpoints
    /// (except health) require `Authorization: Bearer <token>`. If unset,
    /// the server logs a warning and allows unauthenticated access.
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 4810,
            host: "127.0.0.1".into(),
            cors: CorsConfig::default(),
            api_token_env: d_api_token_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. Defaults to localhost-only.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for durable state: episode logs under `episodes/`,
    /// the problem dataset at `problems.json`.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "d_policy_url")]
    pub base_url: String,
    /// Sampling strategy the policy service should apply.
    #[serde(default = "d_strategy")]
    pub strategy: String,
    #[serde(default = "d_top_k")]
    pub top_k: u32,
    #[serde(default = "d_policy_temperature")]
    pub temperature: f32,
    /// Exploration rate for epsilon-greedy strategies.
    #[serde(default)]
    pub epsilon: f32,
    #[serde(default = "d_policy_timeout")]
    pub timeout_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            base_url: d_policy_url(),
            strategy: d_strategy(),
            top_k: d_top_k(),
            temperature: d_policy_temperature(),
            epsilon: 0.0,
            timeout_secs: d_policy_timeout(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Completion backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "d_completion_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    /// Environment variable holding the backend API key. Empty means the
    /// backend is unauthenticated (local inference server).
    #[serde(default)]
    pub api_key_env: String,
    /// Upper bound on the whole stream, connect to last chunk.
    #[serde(default = "d_completion_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: d_completion_url(),
            model: d_model(),
            max_tokens: d_max_tokens(),
            api_key_env: String::new(),
            timeout_secs: d_completion_timeout(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Test-execution service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesterConfig {
    #[serde(default = "d_tester_url")]
    pub base_url: String,
    #[serde(default = "d_tester_timeout")]
    pub timeout_secs: u64,
    /// Attempts per job before it is marked failed.
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff between attempts; doubles each retry.
    #[serde(default = "d_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            base_url: d_tester_url(),
            timeout_secs: d_tester_timeout(),
            max_attempts: d_max_attempts(),
            backoff_ms: d_backoff_ms(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Background jobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Fixed worker-pool size for the test orchestrator.
    #[serde(default = "d_workers")]
    pub workers: usize,
    /// Bounded queue capacity; `end` fails fast when the queue is full.
    #[serde(default = "d_queue_capacity")]
    pub queue_capacity: usize,
}

impl JobsConfig {
    /// Clamp to sane bounds regardless of what the file says.
    pub fn clamped(&self) -> Self {
        Self {
            workers: self.workers.clamp(1, 32),
            queue_capacity: self.queue_capacity.clamp(1, 10_000),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: d_workers(),
            queue_capacity: d_queue_capacity(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "d_service_name")]
    pub service_name: String,
    /// OTLP/gRPC endpoint for span export. `None` disables OpenTelemetry.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: d_service_name(),
            otlp_endpoint: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub tester: TesterConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Severity of a config validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

/// One validation finding, displayable as `field: message`.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    /// Parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Check for suspicious or outright broken values. Errors block boot;
    /// warnings are logged and tolerated.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.jobs.workers == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "jobs.workers",
                message: "must be at least 1".into(),
            });
        }
        if self.jobs.queue_capacity == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "jobs.queue_capacity",
                message: "must be at least 1".into(),
            });
        }
        if self.tester.max_attempts == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "tester.max_attempts",
                message: "must be at least 1".into(),
            });
        }
        for (field, url) in [
            ("policy.base_url", &self.policy.base_url),
            ("completion.base_url", &self.completion.base_url),
            ("tester.base_url", &self.tester.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field,
                    message: format!("'{url}' is not an http(s) URL"),
                });
            }
        }
        if !(0.0..=2.0).contains(&self.policy.temperature) {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "policy.temperature",
                message: format!("{} is outside the usual 0.0–2.0 range", self.policy.temperature),
            });
        }
        if !(0.0..=1.0).contains(&self.policy.epsilon) {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "policy.epsilon",
                message: format!("{} is not a probability", self.policy.epsilon),
            });
        }
        if self.jobs.workers > 16 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "jobs.workers",
                message: format!(
                    "{} workers will hammer the tester service; single digits are plenty",
                    self.jobs.workers
                ),
            });
        }

        issues
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_port() -> u16 {
    4810
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:*".into(),
        "http://127.0.0.1:*".into(),
    ]
}
fn d_api_token_env() -> String {
    "CA_API_TOKEN".into()
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
fn d_policy_url() -> String {
    "http://127.0.0.1:8701".into()
}
fn d_strategy() -> String {
    "top_k".into()
}
fn d_top_k() -> u32 {
    5
}
fn d_policy_temperature() -> f32 {
    1.0
}
fn d_policy_timeout() -> u64 {
    10
}
fn d_completion_url() -> String {
    "http://127.0.0.1:8702".into()
}
fn d_model() -> String {
    "codeassist-fim-7b".into()
}
fn d_max_tokens() -> u32 {
    256
}
fn d_completion_timeout() -> u64 {
    60
}
fn d_tester_url() -> String {
    "http://127.0.0.1:8703".into()
}
fn d_tester_timeout() -> u64 {
    30
}
fn d_max_attempts() -> u32 {
    3
}
fn d_backoff_ms() -> u64 {
    500
}
fn d_workers() -> usize {
    4
}
fn d_queue_capacity() -> usize {
    256
}
fn d_service_name() -> String {
    "codeassist-state-service".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_all_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.server.port, 4810);
        assert_eq!(cfg.jobs.workers, 4);
        assert_eq!(cfg.tester.max_attempts, 3);
        assert!(cfg.observability.otlp_endpoint.is_none());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [jobs]
            workers = 2
        "#,
        )
        .unwrap();
        assert_eq!(cfg.jobs.workers, 2);
        assert_eq!(cfg.jobs.queue_capacity, 256);
    }

    #[test]
    fn zero_workers_is_an_error() {
        let cfg: Config = toml::from_str(
            r#"
            [jobs]
            workers = 0
        "#,
        )
        .unwrap();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == "jobs.workers"));
    }

    #[test]
    fn non_http_url_is_an_error() {
        let cfg: Config = toml::from_str(
            r#"
            [tester]
            base_url = "ftp://nope"
        "#,
        )
        .unwrap();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == "tester.base_url"));
    }

    #[test]
    fn epsilon_must_be_probability() {
        let cfg: Config = toml::from_str(
            r#"
            [policy]
            epsilon = 1.5
        "#,
        )
        .unwrap();
        assert!(cfg
            .validate()
            .iter()
            .any(|i| i.field == "policy.epsilon" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn jobs_clamped_bounds() {
        let jobs = JobsConfig {
            workers: 500,
            queue_capacity: 0,
        };
        let c = jobs.clamped();
        assert_eq!(c.workers, 32);
        assert_eq!(c.queue_capacity, 1);
    }
}
