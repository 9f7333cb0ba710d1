//! The contracts every command handler and node behaviour must fulfil.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{CommandError, CommandRegistry, NodeError};

/// A named command owned by an external subsystem (scene control, TTS, alerts, …).
///
/// Arguments arrive positionally, already placeholder-substituted.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn call(&self, args: &[Value]) -> Result<Value, CommandError>;
}

/// Adapter turning a plain closure into a [`CommandHandler`].
pub struct FnCommand<F>(pub F);

#[async_trait]
impl<F> CommandHandler for FnCommand<F>
where
    F: Fn(&[Value]) -> Result<Value, CommandError> + Send + Sync + 'static,
{
    async fn call(&self, args: &[Value]) -> Result<Value, CommandError> {
        (self.0)(args)
    }
}

/// Shared context passed to every node during one workflow execution.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// behaviours can import it without a circular dependency.
pub struct ExecutionContext {
    /// ID of the parent workflow.
    pub workflow_id: Uuid,
    /// ID of the current execution run.
    pub execution_id: Uuid,
    /// Trigger context (event payload, manual parameters).
    pub input: HashMap<String, String>,
    /// The run's working copy of the workflow variables.
    pub variables: Mutex<HashMap<String, Value>>,
    /// Commands node behaviours may forward to.
    pub commands: Arc<CommandRegistry>,
}

impl ExecutionContext {
    pub fn new(
        workflow_id: Uuid,
        execution_id: Uuid,
        input: HashMap<String, String>,
        variables: HashMap<String, Value>,
        commands: Arc<CommandRegistry>,
    ) -> Self {
        Self {
            workflow_id,
            execution_id,
            input,
            variables: Mutex::new(variables),
            commands,
        }
    }

    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        // A poisoned lock only means another node panicked mid-write; the map is still usable.
        let mut vars = self.variables.lock().unwrap_or_else(|e| e.into_inner());
        vars.insert(name.into(), value);
    }

    pub fn variables_snapshot(&self) -> HashMap<String, Value> {
        self.variables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Built-in behaviour behind a node template id.
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    /// Run one node with its (placeholder-substituted) config and return its output.
    async fn execute(&self, config: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError>;
}
