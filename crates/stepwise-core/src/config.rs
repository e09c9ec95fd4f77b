use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, StepwiseError};

/// Task used when neither the command line nor the config file supplies one.
pub const DEFAULT_TASK: &str = "Two quantum states with energies E1 and E2 have a lifetime of 10^-9 sec and 10^-8 sec, respectively. \
We want to clearly distinguish these two energy levels. \
Which one of the following options could be their energy difference so that they can be clearly resolved?
Choices: (A) 10^-9 eV, (B) 10^-11 eV, (C) 10^-8 eV, (D) 10^-4 eV";

/// Environment variables that override `model.base_url`, highest priority first.
pub const MODEL_BACKEND_ENV_VARS: &[&str] = &["STEPWISE_MODEL_BACKEND_URL", "OLLAMA_BASE_URL"];

/// Top-level Stepwise configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub model: ModelBackendConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Invocation URLs of the four inference microservices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_e1_url")]
    pub e1_url: String,
    #[serde(default = "default_e2_url")]
    pub e2_url: String,
    #[serde(default = "default_analyze_url")]
    pub analyze_url: String,
    #[serde(default = "default_final_url")]
    pub final_url: String,
    /// Diagnostic path probed on each service's origin by the readiness gate.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            e1_url: default_e1_url(),
            e2_url: default_e2_url(),
            analyze_url: default_analyze_url(),
            final_url: default_final_url(),
            probe_path: default_probe_path(),
        }
    }
}

impl ServicesConfig {
    /// All invocation URLs, labelled, in pipeline order.
    pub fn endpoints(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("e1", self.e1_url.as_str()),
            ("e2", self.e2_url.as_str()),
            ("analyze", self.analyze_url.as_str()),
            ("final", self.final_url.as_str()),
        ]
    }
}

/// Model-provisioning backend (an Ollama-compatible server).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBackendConfig {
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Ask the backend to pull `name` once it is live.
    #[serde(default = "default_true")]
    pub pull: bool,
}

impl Default for ModelBackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            name: default_model_name(),
            pull: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Attempts per target before it is declared unavailable.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Per-request timeout for a single probe.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Check all targets at once instead of one after another.
    #[serde(default)]
    pub concurrent: bool,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            concurrent: false,
        }
    }
}

impl ReadinessConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ceiling on analysis executions per run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Analyses shorter than this are retried while attempts remain.
    #[serde(default = "default_min_analysis_chars")]
    pub min_analysis_chars: usize,
    #[serde(default)]
    pub task: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_analysis_chars: default_min_analysis_chars(),
            task: None,
        }
    }
}

impl PipelineConfig {
    /// The configured task, or the built-in default.
    pub fn task_or_default(&self) -> &str {
        self.task.as_deref().unwrap_or(DEFAULT_TASK)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Request timeout for microservice calls. No timeout when unset.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

fn default_e1_url() -> String { "http://agent_e1_service:8000/invoke".to_string() }
fn default_e2_url() -> String { "http://agent_e2_service:8000/invoke".to_string() }
fn default_analyze_url() -> String { "http://agent_analyze_service:8000/invoke".to_string() }
fn default_final_url() -> String { "http://agent_final_service:8000/invoke".to_string() }
fn default_probe_path() -> String { "/docs".to_string() }
fn default_model_base_url() -> String { "http://ollama_service:11434".to_string() }
fn default_model_name() -> String { "llama3".to_string() }
fn default_true() -> bool { true }
fn default_max_retries() -> u32 { 10 }
fn default_retry_delay_secs() -> u64 { 5 }
fn default_probe_timeout_secs() -> u64 { 5 }
fn default_max_attempts() -> u32 { 3 }
fn default_min_analysis_chars() -> usize { 50 }

impl AppConfig {
    /// Load config from a TOML file, expanding `${ENV_VAR}` references.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StepwiseError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text, expanding `${ENV_VAR}` references.
    pub fn from_toml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content, |name| std::env::var(name).ok());
        toml::from_str(&expanded).map_err(|e| StepwiseError::Config(e.to_string()))
    }

    /// Apply process environment overrides (the model backend address).
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` to resolve environment variable names.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for key in MODEL_BACKEND_ENV_VARS {
            if let Some(url) = lookup(key).filter(|v| !v.trim().is_empty()) {
                tracing::debug!(var = %key, url = %url, "Model backend URL overridden from environment");
                self.model.base_url = url;
                break;
            }
        }
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_attempts == 0 {
            return Err(StepwiseError::Config(
                "pipeline.max_attempts must be at least 1".into(),
            ));
        }
        if self.readiness.max_retries == 0 {
            return Err(StepwiseError::Config(
                "readiness.max_retries must be at least 1".into(),
            ));
        }
        if !self.services.probe_path.starts_with('/') {
            return Err(StepwiseError::Config(format!(
                "services.probe_path must start with '/': {}",
                self.services.probe_path
            )));
        }
        check_url("model.base_url", &self.model.base_url)?;
        for (label, url) in self.services.endpoints() {
            check_url(&format!("services.{}_url", label), url)?;
        }
        Ok(())
    }
}

fn check_url(field: &str, raw: &str) -> Result<()> {
    let invalid = |reason: String| {
        StepwiseError::Config(format!("{} is not a valid http(s) URL ({}): {}", field, reason, raw))
    };
    let parsed = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".into()));
    }
    Ok(())
}

/// Replace `${NAME}` with `lookup(NAME)`.
///
/// Unresolved references and an unterminated `${` are left as written.
fn expand_env_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        result.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match lookup(name) {
                    Some(value) => result.push_str(&value),
                    None => result.push_str(&rest[open..open + close + 3]),
                }
                rest = &after[close + 1..];
            }
            None => {
                result.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}
