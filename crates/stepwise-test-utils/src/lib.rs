//! Mocks and fixtures shared by the Stepwise crates' tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use stepwise_core::config::AppConfig;
use stepwise_core::error::{Result, StepwiseError};
use stepwise_core::traits::{Probe, ServiceClient};

pub const E1_URL: &str = "http://e1.test/invoke";
pub const E2_URL: &str = "http://e2.test/invoke";
pub const ANALYZE_URL: &str = "http://analyze.test/invoke";
pub const FINAL_URL: &str = "http://final.test/invoke";

/// A scripted reply from a mock service.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    TransportFailure,
    Status(u16, String),
    Malformed,
}

impl Reply {
    fn into_result(self, url: &str) -> Result<String> {
        match self {
            Reply::Text(text) => Ok(text),
            Reply::TransportFailure => Err(StepwiseError::Transport {
                url: url.to_string(),
                message: "connection refused".into(),
            }),
            Reply::Status(status, body) => Err(StepwiseError::Remote {
                url: url.to_string(),
                status,
                body,
            }),
            Reply::Malformed => Err(StepwiseError::MalformedResponse {
                url: url.to_string(),
                message: "missing field `output`".into(),
            }),
        }
    }
}

#[derive(Default)]
struct Script {
    queue: VecDeque<Reply>,
    last: Option<Reply>,
}

/// One recorded call to the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: String,
    pub payload: serde_json::Value,
}

/// `ServiceClient` with per-endpoint scripted replies and a call log.
///
/// Replies are consumed in order; once a script runs out, its last reply repeats.
#[derive(Default)]
pub struct MockServiceClient {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockServiceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `endpoint` with `text`.
    pub fn respond(self, endpoint: &str, text: impl Into<String>) -> Self {
        self.script(endpoint, vec![Reply::Text(text.into())])
    }

    /// Answer `endpoint` with each text in turn, repeating the last.
    pub fn respond_sequence(self, endpoint: &str, texts: &[&str]) -> Self {
        self.script(
            endpoint,
            texts.iter().map(|t| Reply::Text(t.to_string())).collect(),
        )
    }

    /// Queue arbitrary replies for `endpoint`.
    pub fn script(self, endpoint: &str, replies: Vec<Reply>) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(endpoint.to_string()).or_default();
            script.queue.extend(replies);
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Payloads sent to `endpoint`, in call order.
    pub fn payloads_for(&self, endpoint: &str) -> Vec<serde_json::Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .map(|c| c.payload.clone())
            .collect()
    }

    pub fn call_count(&self, endpoint: &str) -> usize {
        self.payloads_for(endpoint).len()
    }
}

impl ServiceClient for MockServiceClient {
    fn call(&self, endpoint: &str, payload: serde_json::Value) -> BoxFuture<'_, Result<String>> {
        self.calls.lock().unwrap().push(RecordedCall {
            endpoint: endpoint.to_string(),
            payload,
        });

        let reply = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.get_mut(endpoint).and_then(|script| {
                if let Some(next) = script.queue.pop_front() {
                    script.last = Some(next.clone());
                    Some(next)
                } else {
                    script.last.clone()
                }
            })
        };

        let result = reply
            .unwrap_or(Reply::TransportFailure)
            .into_result(endpoint);
        Box::pin(async move { result })
    }
}

/// Probe that fails a fixed number of times before reporting ready.
pub struct ScriptedProbe {
    name: String,
    failures_before_ready: Option<u32>,
    attempts: AtomicU32,
}

impl ScriptedProbe {
    pub fn ready(name: &str) -> Self {
        Self::failing_then_ready(name, 0)
    }

    pub fn failing_then_ready(name: &str, failures: u32) -> Self {
        Self {
            name: name.to_string(),
            failures_before_ready: Some(failures),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn never_ready(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failures_before_ready: None,
            attempts: AtomicU32::new(0),
        }
    }

    /// Checks performed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Probe for ScriptedProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> BoxFuture<'_, Result<()>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let ready = matches!(self.failures_before_ready, Some(f) if attempt > f);
        let result = if ready {
            Ok(())
        } else {
            Err(StepwiseError::Transport {
                url: format!("scripted://{}", self.name),
                message: "connection refused".into(),
            })
        };
        Box::pin(async move { result })
    }
}

/// Config pointing at the mock service URLs with an instant readiness budget.
pub fn sample_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.services.e1_url = E1_URL.into();
    config.services.e2_url = E2_URL.into();
    config.services.analyze_url = ANALYZE_URL.into();
    config.services.final_url = FINAL_URL.into();
    config.readiness.max_retries = 3;
    config.readiness.retry_delay_secs = 0;
    config.pipeline.task = Some("sample".into());
    config
}
