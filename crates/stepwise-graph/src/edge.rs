use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stepwise_core::error::{Result, StepwiseError};
use stepwise_core::types::Route;

use crate::router::Router;
use crate::state::ExecutionState;

/// Marker placed before the entry node in a run trace.
pub const START: &str = "__start__";
/// Terminal marker. Not a node; reaching it ends the run.
pub const END: &str = "__end__";

/// Where an edge leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Node(String),
    End,
}

impl Target {
    pub fn node(name: impl Into<String>) -> Self {
        Target::Node(name.into())
    }

    /// Node name, or the terminal marker.
    pub fn name(&self) -> &str {
        match self {
            Target::Node(name) => name,
            Target::End => END,
        }
    }
}

/// The single outgoing edge set of a node.
#[derive(Debug, Clone)]
pub enum Edge {
    /// Always go to the same successor.
    Always(Target),
    /// Ask the router and follow the branch for its label.
    Conditional {
        router: Router,
        branches: BTreeMap<Route, Target>,
    },
}

impl Edge {
    /// Create an unconditional edge to a node.
    pub fn always(to: impl Into<String>) -> Self {
        Edge::Always(Target::node(to))
    }

    /// Create an unconditional edge to the terminal marker.
    pub fn to_end() -> Self {
        Edge::Always(Target::End)
    }

    /// Create a conditional edge from a router and its branch table.
    pub fn conditional(
        router: impl Into<Router>,
        branches: impl IntoIterator<Item = (Route, Target)>,
    ) -> Self {
        Edge::Conditional {
            router: router.into(),
            branches: branches.into_iter().collect(),
        }
    }

    /// Every target this edge can lead to.
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            Edge::Always(t) => vec![t],
            Edge::Conditional { branches, .. } => branches.values().collect(),
        }
    }

    /// Pick the successor for `state`, evaluated after the source node's patch is merged.
    ///
    /// Returns the router's label for conditional edges.
    pub fn resolve(&self, from: &str, state: &ExecutionState) -> Result<(Option<Route>, &Target)> {
        match self {
            Edge::Always(t) => Ok((None, t)),
            Edge::Conditional { router, branches } => {
                let route = router.decide(state);
                let target = branches.get(&route).ok_or_else(|| {
                    StepwiseError::Graph(format!(
                        "Router on '{}' returned '{}' which has no branch",
                        from, route
                    ))
                })?;
                Ok((Some(route), target))
            }
        }
    }
}
