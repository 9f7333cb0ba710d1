//! Workflow execution engine.
//!
//! `WorkflowExecutor` runs a single workflow execution:
//! 1. Orders the nodes: stored order by default; the connection graph is not
//!    consulted unless `ExecutionOrder::Topological` is configured.
//! 2. Skips disabled nodes, logs each enabled node, fills `{{key}}`
//!    placeholders in its config, and dispatches on `template_id` through the
//!    behaviour table. Ids without a behaviour get a log line and nothing else.
//! 3. Records each node's output in `Execution::results`.
//! 4. Handles `NodeError::Retryable` (up to `max_retries`) and
//!    `NodeError::Fatal` (abort immediately). The first unhandled error fails
//!    the execution and stops the remaining nodes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nodes::traits::ExecutionContext;
use nodes::{BehaviorTable, CommandRegistry, NodeBehavior, NodeError};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::dag::topological_order;
use crate::models::{Context, Execution, LogLevel, Workflow, WorkflowNode};
use crate::placeholders::render_value;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which order nodes run in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionOrder {
    /// Insertion order of `Workflow::nodes`; connections are ignored.
    #[default]
    Stored,
    /// Topological order of the connection graph. Cycles fail the execution.
    Topological,
}

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of times a retryable node failure will be retried.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
    pub order: ExecutionOrder,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_base_delay: Duration::from_millis(100),
            order: ExecutionOrder::Stored,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator for workflow runs.
///
/// Construct one per process and call [`WorkflowExecutor::run`] for each
/// execution; concurrent runs share nothing but the registries.
pub struct WorkflowExecutor {
    commands: Arc<CommandRegistry>,
    behaviors: BehaviorTable,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(commands: Arc<CommandRegistry>, behaviors: BehaviorTable, config: ExecutorConfig) -> Self {
        Self {
            commands,
            behaviors,
            config,
        }
    }

    /// Run `workflow` into `execution`, which must be freshly started.
    ///
    /// Never fails: errors are recorded on the execution, which leaves here
    /// either `Completed` or `Failed`. Returns the run's final variables.
    #[instrument(skip_all, fields(workflow_id = %workflow.id, execution_id = %execution.id))]
    pub async fn run(
        &self,
        workflow: &Workflow,
        execution: &mut Execution,
        context: &Context,
    ) -> HashMap<String, Value> {
        let ctx = ExecutionContext::new(
            workflow.id,
            execution.id,
            context.clone(),
            workflow.variables.clone(),
            self.commands.clone(),
        );

        let nodes = match self.ordered_nodes(workflow) {
            Ok(nodes) => nodes,
            Err(e) => {
                error!("workflow '{}' cannot be ordered: {}", workflow.name, e);
                execution.log(LogLevel::Error, None, e.to_string());
                execution.fail(e.to_string());
                return ctx.variables_snapshot();
            }
        };
        info!("executing {} node(s) of workflow '{}'", nodes.len(), workflow.name);

        for node in nodes {
            if !node.enabled {
                continue;
            }
            execution.log(LogLevel::Info, Some(&node.id), format!("Executing node: {}", node.name));

            let Some(behavior) = self.behaviors.get(&node.template_id) else {
                info!("node '{}' ({}) has no built-in behaviour", node.name, node.template_id);
                execution.log(
                    LogLevel::Info,
                    Some(&node.id),
                    format!("Node '{}' ({}) logged only", node.name, node.template_id),
                );
                continue;
            };

            let config = render_value(&node.config, context);
            match self.execute_with_retry(node, behavior.as_ref(), &config, &ctx).await {
                Ok(output) => {
                    execution.results.insert(node.id.clone(), output);
                }
                Err(engine_err) => {
                    error!("node '{}' failed: {}", node.id, engine_err);
                    execution.log(
                        LogLevel::Error,
                        Some(&node.id),
                        format!("Node '{}' failed: {}", node.name, engine_err),
                    );
                    execution.fail(engine_err.to_string());
                    return ctx.variables_snapshot();
                }
            }
        }

        execution.complete();
        info!("workflow '{}' execution {} completed", workflow.id, execution.id);
        ctx.variables_snapshot()
    }

    fn ordered_nodes<'w>(&self, workflow: &'w Workflow) -> Result<Vec<&'w WorkflowNode>, EngineError> {
        match self.config.order {
            ExecutionOrder::Stored => Ok(workflow.nodes.iter().collect()),
            ExecutionOrder::Topological => {
                let ids = topological_order(workflow)?;
                Ok(ids.iter().filter_map(|id| workflow.node(id)).collect())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal: execute a single node with retry logic.
    // -----------------------------------------------------------------------

    async fn execute_with_retry(
        &self,
        node: &WorkflowNode,
        behavior: &dyn NodeBehavior,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        let mut attempts = 0u32;

        loop {
            match behavior.execute(config, ctx).await {
                Ok(output) => return Ok(output),

                Err(NodeError::Fatal(msg)) => {
                    return Err(EngineError::NodeFatal {
                        node_id: node.id.clone(),
                        message: msg,
                    });
                }

                Err(NodeError::Retryable(msg)) => {
                    attempts += 1;
                    if attempts > self.config.max_retries {
                        return Err(EngineError::NodeRetryExhausted {
                            node_id: node.id.clone(),
                            message: msg,
                        });
                    }

                    let delay = retry_delay(self.config.retry_base_delay, attempts);

                    warn!(
                        "node '{}' retryable error (attempt {}/{}), retrying in {:?}: {}",
                        node.id, attempts, self.config.max_retries, delay, msg
                    );

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Upper bound for a single back-off pause.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Exponential back-off for the `attempt`-th retry (1-based), capped at
/// [`MAX_RETRY_DELAY`].
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}
