//! Engine-level error types.

use dsl::Diagnostic;
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the automation engine (stores, validation, execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Lookup errors ------

    #[error("script {0} not found")]
    ScriptNotFound(Uuid),

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("node '{node_id}' not found in workflow {workflow_id}")]
    NodeNotFound { workflow_id: Uuid, node_id: String },

    // ------ Validation errors ------

    /// The script does not parse; nothing was executed.
    #[error("script does not compile: {}", first_message(.0))]
    Syntax(Vec<Diagnostic>),

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A connection references a node ID that doesn't exist in the workflow.
    #[error("connection references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    // ------ Execution errors ------

    /// A node failed with a fatal error; the whole execution is aborted.
    #[error("node '{node_id}' failed fatally: {message}")]
    NodeFatal {
        node_id: String,
        message: String,
    },

    /// A node's retryable error was exhausted.
    #[error("node '{node_id}' exceeded retry limit: {message}")]
    NodeRetryExhausted {
        node_id: String,
        message: String,
    },

    // ------ Infrastructure ------

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn first_message(diagnostics: &[Diagnostic]) -> String {
    match diagnostics.first() {
        Some(d) => format!("line {}, column {}: {}", d.line, d.column, d.message),
        None => "unknown error".to_string(),
    }
}
