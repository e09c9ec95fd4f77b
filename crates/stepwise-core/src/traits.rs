use futures::future::BoxFuture;

use crate::error::Result;

/// Service client: one JSON request to a step-execution endpoint, one text result back.
///
/// Implementations must not retry. A failed call is returned as-is and the
/// graph executor aborts the run with it.
pub trait ServiceClient: Send + Sync + 'static {
    /// POST `payload` to `endpoint` and return the text field of the response.
    fn call(&self, endpoint: &str, payload: serde_json::Value) -> BoxFuture<'_, Result<String>>;
}

/// A single readiness check against one dependency.
pub trait Probe: Send + Sync + 'static {
    /// Target name used in logs and in `Unavailable` errors.
    fn name(&self) -> &str;

    /// Perform one check. `Ok(())` means the dependency is ready.
    fn check(&self) -> BoxFuture<'_, Result<()>>;
}
