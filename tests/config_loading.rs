use std::io::Write;

use stepwise_core::config::{AppConfig, DEFAULT_TASK};
use stepwise_core::error::StepwiseError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[services]
e1_url = "http://localhost:8001/invoke"
e2_url = "http://localhost:8002/invoke"
analyze_url = "http://localhost:8003/invoke"
final_url = "http://localhost:8004/invoke"
probe_path = "/health"

[model]
base_url = "http://localhost:11434"
name = "mistral"
pull = false

[readiness]
max_retries = 4
retry_delay_secs = 2
probe_timeout_secs = 1
concurrent = true

[pipeline]
max_attempts = 5
min_analysis_chars = 80
task = "What is the energy gap?"

[client]
request_timeout_secs = 30
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    config.validate().expect("valid config");

    assert_eq!(config.services.e1_url, "http://localhost:8001/invoke");
    assert_eq!(config.services.final_url, "http://localhost:8004/invoke");
    assert_eq!(config.services.probe_path, "/health");
    assert_eq!(config.model.base_url, "http://localhost:11434");
    assert_eq!(config.model.name, "mistral");
    assert!(!config.model.pull);
    assert_eq!(config.readiness.max_retries, 4);
    assert_eq!(config.readiness.retry_delay().as_secs(), 2);
    assert_eq!(config.readiness.probe_timeout().as_secs(), 1);
    assert!(config.readiness.concurrent);
    assert_eq!(config.pipeline.max_attempts, 5);
    assert_eq!(config.pipeline.min_analysis_chars, 80);
    assert_eq!(config.pipeline.task_or_default(), "What is the energy gap?");
    assert_eq!(config.client.request_timeout().map(|d| d.as_secs()), Some(30));
}

#[test]
fn test_load_minimal_config_uses_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[model]\nname = \"llama3\"\n")
        .expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    config.validate().expect("valid config");

    assert_eq!(config.services.e1_url, "http://agent_e1_service:8000/invoke");
    assert_eq!(config.services.probe_path, "/docs");
    assert_eq!(config.model.base_url, "http://ollama_service:11434");
    assert!(config.model.pull);
    assert_eq!(config.readiness.max_retries, 10);
    assert_eq!(config.readiness.retry_delay().as_secs(), 5);
    assert_eq!(config.pipeline.max_attempts, 3);
    assert_eq!(config.pipeline.min_analysis_chars, 50);
    assert_eq!(config.pipeline.task_or_default(), DEFAULT_TASK);
    assert!(config.client.request_timeout().is_none());
}

#[test]
fn test_missing_file_is_config_not_found() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, StepwiseError::ConfigNotFound(_)));
}

#[test]
fn test_env_var_expansion_in_file() {
    std::env::set_var("STEPWISE_TEST_MODEL_NAME", "phi3");
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[model]\nname = \"${STEPWISE_TEST_MODEL_NAME}\"\n")
        .expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.name, "phi3");
}

#[test]
fn test_loaded_config_rejects_bad_values() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[pipeline]\nmax_attempts = 0\n")
        .expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert!(matches!(config.validate(), Err(StepwiseError::Config(_))));
}

#[test]
fn test_backend_override_applies_after_load() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[model]\nbase_url = \"http://file-host:11434\"\n")
        .expect("write toml");

    let mut config = AppConfig::load(tmp.path()).expect("load config");
    config.apply_overrides_from(|key| match key {
        "OLLAMA_BASE_URL" => Some("http://env-host:11434".to_string()),
        _ => None,
    });
    assert_eq!(config.model.base_url, "http://env-host:11434");
}
