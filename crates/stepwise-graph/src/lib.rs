//! Graph execution engine for cyclic multi-step workflows.
//!
//! A workflow is a directed graph of named `Node`s. Each node maps the shared
//! `ExecutionState` to a `StatePatch` that is merged back into it. Every node
//! has exactly one outgoing `Edge`: either a fixed successor or a router whose
//! `Route` label is looked up in a branch table. Self-loops are allowed; the
//! router is responsible for eventually choosing the terminal marker.
//!
//! The `GraphExecutor` walks the graph from the entry node, one node at a
//! time, until a successor resolves to `Target::End`.

pub mod edge;
pub mod executor;
pub mod node;
pub mod pipeline;
pub mod router;
pub mod state;

pub use edge::{Edge, Target, END, START};
pub use executor::{ExecutionResult, GraphBuilder, GraphExecutor, NodeResult};
pub use node::{FnNode, Node, NodeHandler};
pub use pipeline::{build_pipeline, Endpoints, ANALYZE, CALC_E1, CALC_E2, FINAL_ANSWER};
pub use router::{QualityRouter, Router, DEFAULT_MIN_ANALYSIS_CHARS};
pub use state::{ExecutionState, StateField, StatePatch};
pub use stepwise_core::types::Route;
