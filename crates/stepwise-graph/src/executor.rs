use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use stepwise_core::error::{Result, StepwiseError};
use stepwise_core::event::EventBus;
use stepwise_core::types::{Route, RunEvent, RunId};

use super::edge::{Edge, Target, END, START};
use super::node::Node;
use super::state::ExecutionState;

/// Result of executing a single node.
#[derive(Debug, Clone)]
pub struct NodeResult {
    /// Which node was executed.
    pub node: String,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
}

/// Result of executing an entire graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub run_id: RunId,
    /// The final state with all accumulated fields.
    pub state: ExecutionState,
    /// Node names in visit order.
    pub visited: Vec<String>,
    /// Per-node results in execution order.
    pub node_results: Vec<NodeResult>,
    /// Router decisions as `(source node, label)`, in order.
    pub routes: Vec<(String, Route)>,
    pub started_at: DateTime<Utc>,
    /// Total execution time in milliseconds.
    pub total_elapsed_ms: u64,
}

impl ExecutionResult {
    /// Visit sequence framed by the start and terminal markers.
    pub fn trace(&self) -> Vec<String> {
        let mut trace = Vec::with_capacity(self.visited.len() + 2);
        trace.push(START.to_string());
        trace.extend(self.visited.iter().cloned());
        trace.push(END.to_string());
        trace
    }

    /// How many times `node` ran.
    pub fn visits(&self, node: &str) -> usize {
        self.visited.iter().filter(|n| *n == node).count()
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.state.final_answer()
    }
}

/// Collects nodes and edges, then validates them into a `GraphExecutor`.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<(String, Edge)>,
    entry: Option<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Set the outgoing edge set of `from`.
    pub fn add_edge(mut self, from: impl Into<String>, edge: Edge) -> Self {
        self.edges.push((from.into(), edge));
        self
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Validate the graph.
    ///
    /// Node names must be unique, and the entry node must exist. Every node has
    /// exactly one outgoing edge set, and every edge connects known nodes.
    pub fn compile(self) -> Result<GraphExecutor> {
        let entry = self
            .entry
            .ok_or_else(|| StepwiseError::Graph("No entry node set".into()))?;

        let mut nodes = HashMap::with_capacity(self.nodes.len());
        for node in self.nodes {
            if node.name == START || node.name == END {
                return Err(StepwiseError::Graph(format!(
                    "'{}' is reserved and cannot name a node",
                    node.name
                )));
            }
            if nodes.contains_key(&node.name) {
                return Err(StepwiseError::Graph(format!(
                    "Duplicate node '{}'",
                    node.name
                )));
            }
            nodes.insert(node.name.clone(), node);
        }

        if !nodes.contains_key(&entry) {
            return Err(StepwiseError::NodeNotFound(entry));
        }

        let mut edges = HashMap::with_capacity(self.edges.len());
        for (from, edge) in self.edges {
            if !nodes.contains_key(&from) {
                return Err(StepwiseError::NodeNotFound(from));
            }
            for target in edge.targets() {
                if let Target::Node(to) = target {
                    if !nodes.contains_key(to) {
                        return Err(StepwiseError::NodeNotFound(to.clone()));
                    }
                }
            }
            if edges.insert(from.clone(), edge).is_some() {
                return Err(StepwiseError::Graph(format!(
                    "Node '{}' has more than one outgoing edge set",
                    from
                )));
            }
        }

        let missing: HashSet<&String> = nodes.keys().filter(|n| !edges.contains_key(*n)).collect();
        if let Some(name) = missing.into_iter().min() {
            return Err(StepwiseError::Graph(format!(
                "Node '{}' has no outgoing edge",
                name
            )));
        }

        Ok(GraphExecutor {
            nodes,
            edges,
            entry,
            events: None,
            step_limit: None,
        })
    }
}

/// Executes a cyclic workflow graph.
///
/// Starting from the entry node, the executor runs one node at a time. It
/// merges the node's patch into the state and then follows the node's edge.
/// Conditional edges are evaluated against the merged state. The run ends
/// when a successor is the terminal marker. A failing node aborts the run and
/// its error is returned unchanged.
pub struct GraphExecutor {
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
    entry: String,
    events: Option<Arc<EventBus>>,
    step_limit: Option<usize>,
}

impl GraphExecutor {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Publish run events to `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Abort with a graph error once more than `limit` nodes have run.
    /// Without this, cycles are bounded only by their routers.
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = Some(limit);
        self
    }

    fn publish(&self, event: RunEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Execute the graph from the entry node with `initial` as the starting state.
    pub async fn execute(&self, initial: ExecutionState) -> Result<ExecutionResult> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let start = Instant::now();
        let mut state = initial;
        let mut visited: Vec<String> = Vec::new();
        let mut node_results = Vec::new();
        let mut routes = Vec::new();
        let mut current = self.entry.clone();

        info!(run_id = %run_id, entry = %self.entry, "Starting graph run");
        self.publish(RunEvent::RunStarted {
            run_id: run_id.clone(),
            entry: self.entry.clone(),
        });

        loop {
            if let Some(limit) = self.step_limit {
                if visited.len() >= limit {
                    return Err(self.fail(
                        &run_id,
                        &current,
                        StepwiseError::Graph(format!(
                            "Step limit of {} reached before node '{}'",
                            limit, current
                        )),
                    ));
                }
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| StepwiseError::NodeNotFound(current.clone()))?;

            if let Some(field) = node.reads.iter().find(|f| !state.has(**f)) {
                return Err(self.fail(
                    &run_id,
                    &node.name,
                    StepwiseError::Graph(format!(
                        "Node '{}' reads '{}' before any node produced it",
                        node.name, field
                    )),
                ));
            }

            info!(run_id = %run_id, node = %node.name, "Executing graph node");
            self.publish(RunEvent::NodeStarted {
                run_id: run_id.clone(),
                node: node.name.clone(),
            });

            let node_start = Instant::now();
            let patch = match node.handler().run(&state).await {
                Ok(patch) => patch,
                Err(e) => {
                    error!(run_id = %run_id, node = %node.name, error = %e, "Graph node failed, aborting run");
                    return Err(self.fail(&run_id, &node.name, e));
                }
            };

            if let Some(field) = patch.fields().into_iter().find(|f| !node.writes.contains(f)) {
                return Err(self.fail(
                    &run_id,
                    &node.name,
                    StepwiseError::Graph(format!(
                        "Node '{}' wrote undeclared field '{}'",
                        node.name, field
                    )),
                ));
            }

            state.merge(patch);

            let elapsed_ms = node_start.elapsed().as_millis() as u64;
            visited.push(node.name.clone());
            node_results.push(NodeResult {
                node: node.name.clone(),
                elapsed_ms,
            });

            debug!(node = %node.name, elapsed_ms, "Node execution complete");
            self.publish(RunEvent::NodeCompleted {
                run_id: run_id.clone(),
                node: node.name.clone(),
                elapsed_ms,
            });

            let edge = self.edges.get(&current).ok_or_else(|| {
                StepwiseError::Graph(format!("Node '{}' has no outgoing edge", current))
            })?;
            let (route, target) = match edge.resolve(&node.name, &state) {
                Ok(next) => next,
                Err(e) => return Err(self.fail(&run_id, &node.name, e)),
            };

            if let Some(route) = route {
                info!(from = %node.name, route = %route, to = %target.name(), "Router decision");
                routes.push((node.name.clone(), route));
                self.publish(RunEvent::RouteChosen {
                    run_id: run_id.clone(),
                    from: node.name.clone(),
                    route,
                    to: target.name().to_string(),
                });
            }

            match target {
                Target::End => break,
                Target::Node(next) => current = next.clone(),
            }
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(run_id = %run_id, steps = visited.len(), total_elapsed_ms, "Graph run complete");
        self.publish(RunEvent::RunCompleted {
            run_id: run_id.clone(),
            steps: visited.len(),
        });

        Ok(ExecutionResult {
            run_id,
            state,
            visited,
            node_results,
            routes,
            started_at,
            total_elapsed_ms,
        })
    }

    fn fail(&self, run_id: &RunId, node: &str, e: StepwiseError) -> StepwiseError {
        self.publish(RunEvent::RunFailed {
            run_id: run_id.clone(),
            node: node.to_string(),
            error: e.to_string(),
        });
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{QualityRouter, Router};
    use crate::state::{StateField, StatePatch};

    fn bump_node(name: &str) -> Node {
        Node::from_fn(name, |s| {
            Ok(StatePatch::new()
                .with_analysis("short")
                .with_analysis_attempts(s.analysis_attempts() + 1))
        })
        .with_writes(vec![StateField::Analysis, StateField::AnalysisAttempts])
    }

    fn noop(name: &str) -> Node {
        Node::from_fn(name, |_| Ok(StatePatch::new()))
    }

    fn looping_graph(router: Router) -> GraphExecutor {
        GraphExecutor::builder()
            .add_node(noop("a"))
            .add_node(bump_node("loop"))
            .add_node(noop("b"))
            .add_edge("a", Edge::always("loop"))
            .add_edge(
                "loop",
                Edge::conditional(
                    router,
                    [
                        (Route::Continue, Target::node("loop")),
                        (Route::Stop, Target::node("b")),
                    ],
                ),
            )
            .add_edge("b", Edge::to_end())
            .set_entry("a")
            .compile()
            .unwrap()
    }

    #[test]
    fn test_graph_construction() {
        let executor = looping_graph(QualityRouter::default().into());
        assert_eq!(executor.entry(), "a");
        assert_eq!(executor.node_names(), vec!["a", "b", "loop"]);
    }

    #[test]
    fn test_compile_requires_entry() {
        let err = GraphBuilder::new()
            .add_node(noop("a"))
            .add_edge("a", Edge::to_end())
            .compile()
            .err()
            .unwrap();
        assert!(matches!(err, StepwiseError::Graph(_)));

        let err = GraphBuilder::new()
            .add_node(noop("a"))
            .add_edge("a", Edge::to_end())
            .set_entry("missing")
            .compile()
            .err()
            .unwrap();
        assert!(matches!(err, StepwiseError::NodeNotFound(ref n) if n == "missing"));
    }

    #[test]
    fn test_compile_rejects_duplicates_and_reserved_names() {
        let err = GraphBuilder::new()
            .add_node(noop("a"))
            .add_node(noop("a"))
            .add_edge("a", Edge::to_end())
            .set_entry("a")
            .compile()
            .err()
            .unwrap();
        assert!(err.to_string().contains("Duplicate node"));

        let err = GraphBuilder::new()
            .add_node(noop(END))
            .set_entry(END)
            .compile()
            .err()
            .unwrap();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_compile_rejects_bad_edges() {
        // two edge sets from one node
        let err = GraphBuilder::new()
            .add_node(noop("a"))
            .add_edge("a", Edge::to_end())
            .add_edge("a", Edge::always("a"))
            .set_entry("a")
            .compile()
            .err()
            .unwrap();
        assert!(err.to_string().contains("more than one"));

        // edge into an unknown node
        let err = GraphBuilder::new()
            .add_node(noop("a"))
            .add_edge("a", Edge::always("ghost"))
            .set_entry("a")
            .compile()
            .err()
            .unwrap();
        assert!(matches!(err, StepwiseError::NodeNotFound(ref n) if n == "ghost"));

        // edge from an unknown node
        let err = GraphBuilder::new()
            .add_node(noop("a"))
            .add_edge("a", Edge::to_end())
            .add_edge("ghost", Edge::to_end())
            .set_entry("a")
            .compile()
            .err()
            .unwrap();
        assert!(matches!(err, StepwiseError::NodeNotFound(ref n) if n == "ghost"));

        // node without an edge
        let err = GraphBuilder::new()
            .add_node(noop("a"))
            .add_node(noop("b"))
            .add_edge("a", Edge::to_end())
            .set_entry("a")
            .compile()
            .err()
            .unwrap();
        assert!(err.to_string().contains("'b' has no outgoing edge"));
    }

    #[tokio::test]
    async fn test_self_loop_bounded_by_router() {
        let executor = looping_graph(QualityRouter::default().into());
        let result = executor.execute(ExecutionState::new("t", 3)).await.unwrap();

        assert_eq!(result.visited, vec!["a", "loop", "loop", "loop", "b"]);
        assert_eq!(result.state.analysis_attempts(), 3);
        assert_eq!(
            result.routes,
            vec![
                ("loop".to_string(), Route::Continue),
                ("loop".to_string(), Route::Continue),
                ("loop".to_string(), Route::Stop),
            ]
        );
        assert_eq!(result.node_results.len(), 5);
        assert_eq!(result.trace().first().map(String::as_str), Some(START));
        assert_eq!(result.trace().last().map(String::as_str), Some(END));
    }

    #[tokio::test]
    async fn test_visit_sequence_is_deterministic() {
        let executor = looping_graph(Router::Custom(|s| {
            if s.analysis_attempts() < 2 {
                Route::Continue
            } else {
                Route::Stop
            }
        }));

        let first = executor.execute(ExecutionState::new("t", 10)).await.unwrap();
        let second = executor.execute(ExecutionState::new("t", 10)).await.unwrap();
        assert_eq!(first.trace(), second.trace());
        assert_eq!(
            first.trace(),
            vec![START, "a", "loop", "loop", "b", END]
        );
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn test_step_limit_stops_runaway_router() {
        let executor = looping_graph(Router::Custom(|_| Route::Continue)).with_step_limit(20);
        let err = executor
            .execute(ExecutionState::new("t", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, StepwiseError::Graph(ref m) if m.contains("Step limit of 20")));
    }

    #[tokio::test]
    async fn test_node_error_aborts_run() {
        let executor = GraphExecutor::builder()
            .add_node(noop("a"))
            .add_node(Node::from_fn("boom", |_| {
                Err(StepwiseError::Remote {
                    url: "http://svc/invoke".into(),
                    status: 500,
                    body: "internal".into(),
                })
            }))
            .add_node(noop("never"))
            .add_edge("a", Edge::always("boom"))
            .add_edge("boom", Edge::always("never"))
            .add_edge("never", Edge::to_end())
            .set_entry("a")
            .compile()
            .unwrap();

        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let executor = executor.with_event_bus(bus);

        let err = executor.execute(ExecutionState::new("t", 1)).await.unwrap_err();
        assert!(matches!(err, StepwiseError::Remote { status: 500, .. }));

        let mut saw_never = false;
        let mut failed_node = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                RunEvent::NodeStarted { node, .. } if node == "never" => saw_never = true,
                RunEvent::RunFailed { node, .. } => failed_node = Some(node),
                _ => {}
            }
        }
        assert!(!saw_never);
        assert_eq!(failed_node.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_read_before_produce_is_rejected() {
        let executor = GraphExecutor::builder()
            .add_node(noop("final").with_reads(vec![StateField::Analysis]))
            .add_edge("final", Edge::to_end())
            .set_entry("final")
            .compile()
            .unwrap();
        let err = executor.execute(ExecutionState::new("t", 1)).await.unwrap_err();
        assert!(err.to_string().contains("reads 'analysis'"));
    }

    #[tokio::test]
    async fn test_undeclared_write_is_rejected() {
        let executor = GraphExecutor::builder()
            .add_node(Node::from_fn("sneaky", |_| {
                Ok(StatePatch::new().with_final_answer("early"))
            }))
            .add_edge("sneaky", Edge::to_end())
            .set_entry("sneaky")
            .compile()
            .unwrap();
        let err = executor.execute(ExecutionState::new("t", 1)).await.unwrap_err();
        assert!(err.to_string().contains("undeclared field 'final_answer'"));
    }

    #[tokio::test]
    async fn test_events_follow_run() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let executor = looping_graph(QualityRouter::default().into()).with_event_bus(bus);
        let result = executor.execute(ExecutionState::new("t", 2)).await.unwrap();

        let mut started = Vec::new();
        let mut routes = Vec::new();
        let mut completed_steps = None;
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.run_id(), &result.run_id);
            match event {
                RunEvent::NodeStarted { node, .. } => started.push(node),
                RunEvent::RouteChosen { route, to, .. } => routes.push((route, to)),
                RunEvent::RunCompleted { steps, .. } => completed_steps = Some(steps),
                _ => {}
            }
        }
        assert_eq!(started, result.visited);
        assert_eq!(
            routes,
            vec![
                (Route::Continue, "loop".to_string()),
                (Route::Stop, "b".to_string())
            ]
        );
        assert_eq!(completed_steps, Some(4));
    }
}
