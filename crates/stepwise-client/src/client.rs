use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use stepwise_core::error::{Result, StepwiseError};
use stepwise_core::traits::ServiceClient;

/// Response shape shared by every inference microservice.
#[derive(Deserialize, Debug)]
struct ServiceResponse {
    output: String,
}

/// JSON-over-HTTP client for the inference microservices.
///
/// One POST per call, no retries. Transport failures, non-2xx statuses and
/// bodies without a text `output` field map to distinct error kinds.
pub struct HttpServiceClient {
    http: Client,
}

impl HttpServiceClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    /// Build a client that applies `timeout` to every request.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| StepwiseError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

impl Default for HttpServiceClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the `output` text out of a service response body.
pub(crate) fn extract_output(url: &str, body: &str) -> Result<String> {
    serde_json::from_str::<ServiceResponse>(body)
        .map(|r| r.output)
        .map_err(|e| StepwiseError::MalformedResponse {
            url: url.to_string(),
            message: e.to_string(),
        })
}

impl ServiceClient for HttpServiceClient {
    fn call(&self, endpoint: &str, payload: serde_json::Value) -> BoxFuture<'_, Result<String>> {
        let endpoint = endpoint.to_string();

        Box::pin(async move {
            debug!(url = %endpoint, "Calling service");

            let response = self
                .http
                .post(&endpoint)
                .json(&payload)
                .send()
                .await
                .map_err(|e| StepwiseError::Transport {
                    url: endpoint.clone(),
                    message: e.to_string(),
                })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| StepwiseError::Transport {
                    url: endpoint.clone(),
                    message: e.to_string(),
                })?;

            if !status.is_success() {
                warn!(url = %endpoint, status = status.as_u16(), "Service returned an error status");
                return Err(StepwiseError::Remote {
                    url: endpoint,
                    status: status.as_u16(),
                    body,
                });
            }

            extract_output(&endpoint, &body)
        })
    }
}

/// Diagnostic URL for a service: `probe_path` on the invocation URL's origin.
pub fn diagnostic_url(invoke_url: &str, probe_path: &str) -> Result<String> {
    let base = Url::parse(invoke_url)
        .map_err(|e| StepwiseError::Config(format!("Invalid service URL {}: {}", invoke_url, e)))?;
    let url = base
        .join(probe_path)
        .map_err(|e| StepwiseError::Config(format!("Invalid probe path {}: {}", probe_path, e)))?;
    Ok(url.to_string())
}
