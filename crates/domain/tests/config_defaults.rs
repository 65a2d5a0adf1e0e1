//! Full-file config parsing against a realistic deployment TOML.

use ca_domain::config::{Config, ConfigSeverity};

#[test]
fn realistic_config_parses_clean() {
    let cfg: Config = toml::from_str(
        r#"
        [server]
        host = "0.0.0.0"
        port = 4810

        [store]
        state_path = "/var/lib/codeassist"

        [policy]
        base_url = "http://policy.internal:8701"
        strategy = "top_k"
        top_k = 3
        temperature = 0.8
        epsilon = 0.05

        [completion]
        base_url = "http://llm.internal:8702"
        model = "codeassist-fim-7b"
        max_tokens = 512
        api_key_env = "CA_COMPLETION_KEY"

        [tester]
        base_url = "http://tester.internal:8703"
        max_attempts = 5
        backoff_ms = 250

        [jobs]
        workers = 6
        queue_capacity = 512

        [observability]
        service_name = "codeassist-state-service"
        otlp_endpoint = "http://otel-collector:4317"
    "#,
    )
    .unwrap();

    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.policy.top_k, 3);
    assert!((cfg.policy.epsilon - 0.05).abs() < f32::EPSILON);
    assert_eq!(cfg.completion.max_tokens, 512);
    assert_eq!(cfg.tester.max_attempts, 5);
    assert_eq!(cfg.jobs.workers, 6);
    assert_eq!(
        cfg.observability.otlp_endpoint.as_deref(),
        Some("http://otel-collector:4317")
    );
    assert!(cfg.validate().is_empty());
}

#[test]
fn validation_warns_without_blocking() {
    let cfg: Config = toml::from_str(
        r#"
        [jobs]
        workers = 20
    "#,
    )
    .unwrap();
    let issues = cfg.validate();
    assert!(!issues.is_empty());
    assert!(issues.iter().all(|i| i.severity == ConfigSeverity::Warning));
}

#[test]
fn config_roundtrips_through_toml() {
    let cfg = Config::default();
    let serialized = toml::to_string(&cfg).unwrap();
    let back: Config = toml::from_str(&serialized).unwrap();
    assert_eq!(back.server.port, cfg.server.port);
    assert_eq!(back.jobs.queue_capacity, cfg.jobs.queue_capacity);
}
