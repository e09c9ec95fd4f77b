use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::ndjson::{NdjsonDecoder, PullStatus};

/// How a model pull ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The backend reported `status == "success"`.
    Completed,
    /// The stream closed without a success record.
    StreamEnded,
    /// The pull could not be carried out. The model may already be present.
    Skipped { reason: String },
}

/// Client for the model-provisioning backend (Ollama `/api/pull`).
pub struct ModelProvisioner {
    http: Client,
    base_url: String,
}

impl ModelProvisioner {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn pull_url(&self) -> String {
        format!("{}/api/pull", self.base_url.trim_end_matches('/'))
    }

    /// Ask the backend to pull `model`, following its NDJSON status stream.
    ///
    /// Best-effort: failures are logged and reported as `Skipped`, never returned as errors.
    pub async fn pull(&self, model: &str) -> PullOutcome {
        let url = self.pull_url();
        info!(model, url = %url, "Pulling model (this may take a while)");

        let response = match self
            .http
            .post(&url)
            .json(&serde_json::json!({ "name": model }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(model, error = %e, "Model pull failed, the model may already be present");
                return PullOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(model, status = status.as_u16(), "Model pull rejected, the model may already be present");
            return PullOutcome::Skipped {
                reason: format!("HTTP {}", status),
            };
        }

        consume_pull_stream(Box::pin(response.bytes_stream()), model).await
    }
}

/// Drive a pull status stream until a success record or end-of-stream.
///
/// Undecodable lines are skipped. A stream error ends consumption with `Skipped`.
pub async fn consume_pull_stream<S, E>(mut stream: S, model: &str) -> PullOutcome
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut decoder = NdjsonDecoder::new();
    let mut last_status: Option<String> = None;

    while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(b) => b,
            Err(e) => {
                warn!(model, error = %e, "Model pull stream interrupted, the model may already be present");
                return PullOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        for line in decoder.feed(&bytes) {
            if handle_status_line(&line, model, &mut last_status) {
                return PullOutcome::Completed;
            }
        }
    }

    if let Some(line) = decoder.finish() {
        if handle_status_line(&line, model, &mut last_status) {
            return PullOutcome::Completed;
        }
    }

    warn!(model, last_status = ?last_status, "Model pull stream ended without a success status");
    PullOutcome::StreamEnded
}

/// Log one status line. Returns true when it is the terminal success record.
fn handle_status_line(line: &str, model: &str, last_status: &mut Option<String>) -> bool {
    let Some(record) = PullStatus::parse(line) else {
        debug!(line, "Skipping undecodable pull status line");
        return false;
    };

    if let Some(err) = &record.error {
        warn!(model, error = %err, "Model backend reported a pull error");
    }

    let Some(status) = record.status.as_deref() else {
        return false;
    };

    match record.progress_pct() {
        Some(pct) => debug!(model, status, pct, "Model pull progress"),
        None => {
            if last_status.as_deref() != Some(status) {
                info!(model, status, "Model pull status");
            }
        }
    }
    *last_status = Some(status.to_string());

    if record.is_success() {
        info!(model, "Model ready");
        return true;
    }
    false
}
