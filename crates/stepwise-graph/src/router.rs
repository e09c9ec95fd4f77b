use tracing::debug;

use stepwise_core::types::Route;

use crate::state::ExecutionState;

/// Analyses shorter than this many characters are considered too weak to accept.
pub const DEFAULT_MIN_ANALYSIS_CHARS: usize = 50;

/// Quality gate evaluated after the analysis step.
///
/// Policy, in order:
/// 1. attempts exhausted (`analysis_attempts >= max_attempts`) → `Stop`
/// 2. analysis missing or shorter than `min_chars` → `Continue`
/// 3. otherwise → `Stop`
///
/// This only checks that the analysis is non-trivial, not that it is correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityRouter {
    pub min_chars: usize,
}

impl QualityRouter {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    pub fn decide(&self, state: &ExecutionState) -> Route {
        if state.analysis_attempts() >= state.max_attempts() {
            debug!(
                attempts = state.analysis_attempts(),
                max_attempts = state.max_attempts(),
                "Attempt budget exhausted, accepting current analysis"
            );
            return Route::Stop;
        }

        let len = state.analysis().map_or(0, |a| a.chars().count());
        if len < self.min_chars {
            debug!(len, min_chars = self.min_chars, "Analysis missing or too short, retrying");
            Route::Continue
        } else {
            debug!(len, "Analysis accepted");
            Route::Stop
        }
    }
}

impl Default for QualityRouter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_ANALYSIS_CHARS)
    }
}

/// Decision function attached to a conditional edge.
#[derive(Clone, Copy)]
pub enum Router {
    Quality(QualityRouter),
    /// Any pure function of the state.
    Custom(fn(&ExecutionState) -> Route),
}

impl Router {
    pub fn decide(&self, state: &ExecutionState) -> Route {
        match self {
            Router::Quality(q) => q.decide(state),
            Router::Custom(f) => f(state),
        }
    }
}

impl From<QualityRouter> for Router {
    fn from(q: QualityRouter) -> Self {
        Router::Quality(q)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Router::Quality(q) => f.debug_tuple("Quality").field(q).finish(),
            Router::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
