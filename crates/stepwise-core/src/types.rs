use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one graph run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Label returned by a router after a node with conditional edges has run.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Re-enter the routed node.
    Continue,
    /// Leave the cycle.
    Stop,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Continue => "continue",
            Route::Stop => "stop",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Graph run started at the entry node.
    RunStarted { run_id: RunId, entry: String },
    /// A node is about to execute.
    NodeStarted { run_id: RunId, node: String },
    /// A node finished and its patch was merged.
    NodeCompleted {
        run_id: RunId,
        node: String,
        elapsed_ms: u64,
    },
    /// A router picked a branch.
    RouteChosen {
        run_id: RunId,
        from: String,
        route: Route,
        to: String,
    },
    /// The terminal marker was reached.
    RunCompleted { run_id: RunId, steps: usize },
    /// A node failed and the run was aborted.
    RunFailed {
        run_id: RunId,
        node: String,
        error: String,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::NodeStarted { run_id, .. }
            | RunEvent::NodeCompleted { run_id, .. }
            | RunEvent::RouteChosen { run_id, .. }
            | RunEvent::RunCompleted { run_id, .. }
            | RunEvent::RunFailed { run_id, .. } => run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
        assert_eq!(RunId::from_str("abc").to_string(), "abc");
    }

    #[test]
    fn test_route_labels() {
        assert_eq!(Route::Continue.to_string(), "continue");
        assert_eq!(
            serde_json::to_string(&Route::Stop).unwrap(),
            "\"stop\""
        );
    }
}
