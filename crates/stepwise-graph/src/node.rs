use std::sync::Arc;

use futures::future::BoxFuture;

use stepwise_core::error::Result;

use crate::state::{ExecutionState, StateField, StatePatch};

/// The work a node performs: read the state, return a patch.
pub trait NodeHandler: Send + Sync + 'static {
    fn run<'a>(&'a self, state: &'a ExecutionState) -> BoxFuture<'a, Result<StatePatch>>;
}

/// A node in the execution graph.
///
/// `reads` and `writes` are checked by the executor: a node never runs before
/// the fields it reads exist, and its patch may only touch fields it writes.
#[derive(Clone)]
pub struct Node {
    /// Unique name; the graph's key for this node.
    pub name: String,
    pub reads: Vec<StateField>,
    pub writes: Vec<StateField>,
    handler: Arc<dyn NodeHandler>,
}

impl Node {
    pub fn new(name: impl Into<String>, handler: impl NodeHandler) -> Self {
        Self {
            name: name.into(),
            reads: vec![],
            writes: vec![],
            handler: Arc::new(handler),
        }
    }

    /// Set the fields this node reads.
    pub fn with_reads(mut self, fields: Vec<StateField>) -> Self {
        self.reads = fields;
        self
    }

    /// Set the fields this node may write.
    pub fn with_writes(mut self, fields: Vec<StateField>) -> Self {
        self.writes = fields;
        self
    }

    /// Node backed by a synchronous closure.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ExecutionState) -> Result<StatePatch> + Send + Sync + 'static,
    {
        Self::new(name, FnNode::new(f))
    }

    pub fn handler(&self) -> &dyn NodeHandler {
        self.handler.as_ref()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}

/// Adapter turning a synchronous closure into a `NodeHandler`.
pub struct FnNode<F>(F);

impl<F> FnNode<F>
where
    F: Fn(&ExecutionState) -> Result<StatePatch> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> NodeHandler for FnNode<F>
where
    F: Fn(&ExecutionState) -> Result<StatePatch> + Send + Sync + 'static,
{
    fn run<'a>(&'a self, state: &'a ExecutionState) -> BoxFuture<'a, Result<StatePatch>> {
        let result = (self.0)(state);
        Box::pin(async move { result })
    }
}
