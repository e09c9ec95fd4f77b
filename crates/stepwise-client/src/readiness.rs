use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use reqwest::Client;
use tracing::{debug, error, info};

use stepwise_core::config::ReadinessConfig;
use stepwise_core::error::{Result, StepwiseError};
use stepwise_core::traits::Probe;

/// Fixed-delay retry budget applied to each readiness target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per target.
    pub max_retries: u32,
    /// Sleep between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn from_config(config: &ReadinessConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ReadinessConfig::default())
    }
}

/// Readiness probe that GETs a URL and expects a 2xx status.
pub struct HttpProbe {
    name: String,
    url: String,
    http: Client,
}

impl HttpProbe {
    /// Create a probe sharing an existing HTTP client (which carries the probe timeout).
    pub fn with_client(name: impl Into<String>, url: impl Into<String>, http: Client) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            http,
        }
    }
}

/// Build the HTTP client used by readiness probes.
pub fn probe_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| StepwiseError::Config(format!("Failed to build probe client: {}", e)))
}

impl Probe for HttpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let response = self
                .http
                .get(&self.url)
                .send()
                .await
                .map_err(|e| StepwiseError::Transport {
                    url: self.url.clone(),
                    message: e.to_string(),
                })?;

            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(StepwiseError::Remote {
                    url: self.url.clone(),
                    status: status.as_u16(),
                    body: String::new(),
                })
            }
        })
    }
}

/// Poll one target until it is ready or the retry budget runs out.
///
/// Returns the number of attempts it took.
pub async fn await_target(probe: &dyn Probe, policy: &RetryPolicy) -> Result<u32> {
    let mut last_error = String::from("no attempts made");

    for attempt in 1..=policy.max_retries {
        match probe.check().await {
            Ok(()) => {
                info!(target_name = probe.name(), attempt, "Dependency ready");
                return Ok(attempt);
            }
            Err(e) => {
                last_error = e.to_string();
                if attempt < policy.max_retries {
                    debug!(
                        target_name = probe.name(),
                        attempt,
                        max_retries = policy.max_retries,
                        delay_ms = policy.delay.as_millis() as u64,
                        error = %e,
                        "Dependency not ready, retrying"
                    );
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    error!(
        target_name = probe.name(),
        attempts = policy.max_retries,
        error = %last_error,
        "Dependency unavailable"
    );
    Err(StepwiseError::Unavailable {
        target: probe.name().to_string(),
        attempts: policy.max_retries,
        last_error,
    })
}

/// Wait for every target in order. The first exhausted target aborts the wait.
pub async fn await_ready(targets: &[Arc<dyn Probe>], policy: &RetryPolicy) -> Result<()> {
    for probe in targets {
        await_target(probe.as_ref(), policy).await?;
    }
    Ok(())
}

/// Attempts spent on each target during a successful wait.
#[derive(Debug, Clone, Default)]
pub struct ReadinessReport {
    pub attempts: Vec<(String, u32)>,
    pub elapsed_ms: u64,
}

impl ReadinessReport {
    pub fn attempts_for(&self, target: &str) -> Option<u32> {
        self.attempts
            .iter()
            .find(|(name, _)| name == target)
            .map(|(_, n)| *n)
    }
}

/// Blocks startup until all registered dependencies respond.
pub struct ReadinessGate {
    targets: Vec<Arc<dyn Probe>>,
    policy: RetryPolicy,
    concurrent: bool,
}

impl ReadinessGate {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            targets: Vec::new(),
            policy,
            concurrent: false,
        }
    }

    /// Add a target. Targets are checked in insertion order unless concurrent.
    pub fn with_target(mut self, probe: Arc<dyn Probe>) -> Self {
        self.targets.push(probe);
        self
    }

    /// Check all targets at the same time.
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn targets(&self) -> &[Arc<dyn Probe>] {
        &self.targets
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn await_ready(&self) -> Result<ReadinessReport> {
        let start = Instant::now();
        info!(
            targets = self.targets.len(),
            max_retries = self.policy.max_retries,
            delay_secs = self.policy.delay.as_secs(),
            concurrent = self.concurrent,
            "Waiting for dependencies"
        );

        let counts = if self.concurrent {
            futures::future::try_join_all(
                self.targets
                    .iter()
                    .map(|p| await_target(p.as_ref(), &self.policy)),
            )
            .await?
        } else {
            let mut counts = Vec::with_capacity(self.targets.len());
            for probe in &self.targets {
                counts.push(await_target(probe.as_ref(), &self.policy).await?);
            }
            counts
        };

        let attempts = self
            .targets
            .iter()
            .map(|p| p.name().to_string())
            .zip(counts)
            .collect();

        info!("All dependencies are up");
        Ok(ReadinessReport {
            attempts,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}
