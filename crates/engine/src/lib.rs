//! `engine` crate — domain models, the script interpreter, the workflow
//! executor, the script → workflow compiler and the stores behind them.

pub mod automation;
pub mod compiler;
pub mod dag;
pub mod error;
pub mod executor;
pub mod interpreter;
pub mod models;
pub mod placeholders;
pub mod scripts;
pub mod templates;
pub mod workflows;

pub use automation::{AutomationEngine, EngineConfig, EventReport, ScheduleEntry, ScheduleOwner, ScriptRun};
pub use compiler::convert_to_workflow;
pub use dag::topological_order;
pub use error::EngineError;
pub use executor::{ExecutionOrder, ExecutorConfig, WorkflowExecutor};
pub use interpreter::{ActionError, Interpreter, RunResult};
pub use models::{
    Connection, Context, Execution, ExecutionStatus, LogEntry, LogLevel, NodePatch, NodeTemplate, Position,
    Script, Workflow, WorkflowNode, WorkflowPatch,
};
pub use scripts::ScriptStore;
pub use templates::TemplateCatalog;
pub use workflows::WorkflowStore;
