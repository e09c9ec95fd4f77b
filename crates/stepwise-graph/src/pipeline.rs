use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::debug;

use stepwise_core::config::ServicesConfig;
use stepwise_core::error::{Result, StepwiseError};
use stepwise_core::traits::ServiceClient;
use stepwise_core::types::Route;

use crate::edge::{Edge, Target};
use crate::executor::GraphExecutor;
use crate::node::{Node, NodeHandler};
use crate::router::QualityRouter;
use crate::state::{ExecutionState, StateField, StatePatch};

pub const CALC_E1: &str = "calc_e1";
pub const CALC_E2: &str = "calc_e2";
pub const ANALYZE: &str = "analyze";
pub const FINAL_ANSWER: &str = "final_answer";

/// Invoke URLs of the four step services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub e1: String,
    pub e2: String,
    pub analyze: String,
    pub final_answer: String,
}

impl From<&ServicesConfig> for Endpoints {
    fn from(services: &ServicesConfig) -> Self {
        Self {
            e1: services.e1_url.clone(),
            e2: services.e2_url.clone(),
            analyze: services.analyze_url.clone(),
            final_answer: services.final_url.clone(),
        }
    }
}

#[derive(Serialize)]
struct TaskRequest<'a> {
    task: &'a str,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    task: &'a str,
    e1_uncertainty: &'a str,
    e2_uncertainty: &'a str,
}

#[derive(Serialize)]
struct FinalRequest<'a> {
    analysis: &'a str,
}

fn to_payload(request: &impl Serialize) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(request)?)
}

fn required<'a>(value: Option<&'a str>, field: StateField) -> Result<&'a str> {
    value.ok_or_else(|| StepwiseError::Graph(format!("State field '{}' is not set", field)))
}

#[derive(Debug, Clone, Copy)]
enum Level {
    E1,
    E2,
}

/// Asks an energy-uncertainty service about the task.
struct UncertaintyNode {
    client: Arc<dyn ServiceClient>,
    endpoint: String,
    level: Level,
}

impl NodeHandler for UncertaintyNode {
    fn run<'a>(&'a self, state: &'a ExecutionState) -> BoxFuture<'a, Result<StatePatch>> {
        Box::pin(async move {
            let payload = to_payload(&TaskRequest { task: state.task() })?;
            let output = self.client.call(&self.endpoint, payload).await?;
            debug!(level = ?self.level, len = output.len(), "Uncertainty computed");
            Ok(match self.level {
                Level::E1 => StatePatch::new().with_e1_uncertainty(output),
                Level::E2 => StatePatch::new().with_e2_uncertainty(output),
            })
        })
    }
}

/// Combines both uncertainties into an analysis and counts the attempt.
struct AnalyzeNode {
    client: Arc<dyn ServiceClient>,
    endpoint: String,
}

impl NodeHandler for AnalyzeNode {
    fn run<'a>(&'a self, state: &'a ExecutionState) -> BoxFuture<'a, Result<StatePatch>> {
        Box::pin(async move {
            let payload = to_payload(&AnalyzeRequest {
                task: state.task(),
                e1_uncertainty: required(state.e1_uncertainty(), StateField::E1Uncertainty)?,
                e2_uncertainty: required(state.e2_uncertainty(), StateField::E2Uncertainty)?,
            })?;
            let analysis = self.client.call(&self.endpoint, payload).await?;
            let attempts = state.analysis_attempts() + 1;
            debug!(attempt = attempts, len = analysis.chars().count(), "Analysis produced");
            Ok(StatePatch::new()
                .with_analysis(analysis)
                .with_analysis_attempts(attempts))
        })
    }
}

struct FinalAnswerNode {
    client: Arc<dyn ServiceClient>,
    endpoint: String,
}

impl NodeHandler for FinalAnswerNode {
    fn run<'a>(&'a self, state: &'a ExecutionState) -> BoxFuture<'a, Result<StatePatch>> {
        Box::pin(async move {
            let payload = to_payload(&FinalRequest {
                analysis: required(state.analysis(), StateField::Analysis)?,
            })?;
            let answer = self.client.call(&self.endpoint, payload).await?;
            Ok(StatePatch::new().with_final_answer(answer))
        })
    }
}

/// Wire the four-step inference pipeline.
///
/// `calc_e1 → calc_e2 → analyze`, then `analyze` loops on itself while the
/// router says `Continue` and moves to `final_answer` on `Stop`.
pub fn build_pipeline(
    client: Arc<dyn ServiceClient>,
    endpoints: Endpoints,
    router: QualityRouter,
) -> Result<GraphExecutor> {
    let calc_e1 = Node::new(
        CALC_E1,
        UncertaintyNode {
            client: client.clone(),
            endpoint: endpoints.e1,
            level: Level::E1,
        },
    )
    .with_reads(vec![StateField::Task])
    .with_writes(vec![StateField::E1Uncertainty]);

    let calc_e2 = Node::new(
        CALC_E2,
        UncertaintyNode {
            client: client.clone(),
            endpoint: endpoints.e2,
            level: Level::E2,
        },
    )
    .with_reads(vec![StateField::Task])
    .with_writes(vec![StateField::E2Uncertainty]);

    let analyze = Node::new(
        ANALYZE,
        AnalyzeNode {
            client: client.clone(),
            endpoint: endpoints.analyze,
        },
    )
    .with_reads(vec![
        StateField::Task,
        StateField::E1Uncertainty,
        StateField::E2Uncertainty,
        StateField::AnalysisAttempts,
    ])
    .with_writes(vec![StateField::Analysis, StateField::AnalysisAttempts]);

    let final_answer = Node::new(
        FINAL_ANSWER,
        FinalAnswerNode {
            client,
            endpoint: endpoints.final_answer,
        },
    )
    .with_reads(vec![StateField::Analysis])
    .with_writes(vec![StateField::FinalAnswer]);

    GraphExecutor::builder()
        .add_node(calc_e1)
        .add_node(calc_e2)
        .add_node(analyze)
        .add_node(final_answer)
        .add_edge(CALC_E1, Edge::always(CALC_E2))
        .add_edge(CALC_E2, Edge::always(ANALYZE))
        .add_edge(
            ANALYZE,
            Edge::conditional(
                router,
                [
                    (Route::Continue, Target::node(ANALYZE)),
                    (Route::Stop, Target::node(FINAL_ANSWER)),
                ],
            ),
        )
        .add_edge(FINAL_ANSWER, Edge::to_end())
        .set_entry(CALC_E1)
        .compile()
}
