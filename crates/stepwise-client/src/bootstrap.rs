use std::sync::Arc;

use tracing::info;

use stepwise_core::config::AppConfig;
use stepwise_core::error::Result;
use stepwise_core::traits::Probe;

use crate::client::diagnostic_url;
use crate::provision::{ModelProvisioner, PullOutcome};
use crate::readiness::{probe_client, HttpProbe, ReadinessGate, ReadinessReport, RetryPolicy};

/// Name of the model backend target in readiness reports.
pub const MODEL_BACKEND_TARGET: &str = "model-backend";

/// What startup established before the first graph run.
#[derive(Debug, Clone)]
pub struct Startup {
    pub readiness: ReadinessReport,
    /// `None` when pulling is disabled in config.
    pub pull: Option<PullOutcome>,
}

/// Build the readiness gate for `config`: the model backend first, then each service.
pub fn build_gate(config: &AppConfig) -> Result<ReadinessGate> {
    let http = probe_client(config.readiness.probe_timeout())?;

    let mut gate = ReadinessGate::new(RetryPolicy::from_config(&config.readiness))
        .concurrent(config.readiness.concurrent)
        .with_target(Arc::new(HttpProbe::with_client(
            MODEL_BACKEND_TARGET,
            config.model.base_url.clone(),
            http.clone(),
        )));

    for (label, invoke_url) in config.services.endpoints() {
        let url = diagnostic_url(invoke_url, &config.services.probe_path)?;
        let probe: Arc<dyn Probe> = Arc::new(HttpProbe::with_client(
            format!("{}-service", label),
            url,
            http.clone(),
        ));
        gate = gate.with_target(probe);
    }

    Ok(gate)
}

/// Wait for every dependency, then make sure the model is provisioned.
///
/// An unavailable dependency is fatal. A failed pull is not.
pub async fn prepare(config: &AppConfig) -> Result<Startup> {
    let gate = build_gate(config)?;
    let readiness = gate.await_ready().await?;

    let pull = if config.model.pull {
        let provisioner = ModelProvisioner::new(config.model.base_url.clone());
        Some(provisioner.pull(&config.model.name).await)
    } else {
        info!(model = %config.model.name, "Model pull disabled");
        None
    };

    Ok(Startup { readiness, pull })
}
