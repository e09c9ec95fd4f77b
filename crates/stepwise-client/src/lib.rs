pub mod bootstrap;
pub mod client;
pub mod ndjson;
pub mod provision;
pub mod readiness;

pub use bootstrap::{build_gate, prepare, Startup, MODEL_BACKEND_TARGET};
pub use client::{diagnostic_url, HttpServiceClient};
pub use provision::{ModelProvisioner, PullOutcome};
pub use readiness::{await_ready, await_target, HttpProbe, ReadinessGate, ReadinessReport, RetryPolicy};
