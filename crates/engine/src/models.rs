//! Core domain models for the automation engine.
//!
//! These types are the source of truth for what scripts, workflows and
//! executions look like in memory. `Script` and `Workflow` are persisted as
//! JSON rows through the `db` crate; the same JSON shape is used for workflow
//! import/export, so field names are camelCase.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use dsl::{Diagnostic, Program, Trigger};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::EngineError;

/// Key/value context a run is triggered with (event payload, manual params).
pub type Context = HashMap<String, String>;

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// A persisted DSL script.
///
/// Only `code` is authoritative: the parsed `Program` is rebuilt on demand.
/// `diagnostics` caches the result of validating the last edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl Script {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            diagnostics: dsl::validate(&code),
            code,
            enabled: true,
            created_at: Utc::now(),
            last_run: None,
            run_count: 0,
        }
    }

    /// Replace the code and re-validate it.
    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
        self.diagnostics = dsl::validate(&self.code);
    }

    /// True when the last validation found no errors.
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Parse the current code.
    ///
    /// # Errors
    /// [`EngineError::Syntax`] with the diagnostics if the code does not parse.
    pub fn program(&self) -> Result<Program, EngineError> {
        dsl::compile(&self.code).map_err(EngineError::Syntax)
    }

    pub(crate) fn record_run(&mut self, at: DateTime<Utc>) {
        self.run_count += 1;
        self.last_run = Some(at);
    }
}

// ---------------------------------------------------------------------------
// Node templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    Trigger,
    Action,
    Logic,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Any,
}

/// A named, typed input or output of a node template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParameterType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Catalog entry nodes are instantiated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplate {
    pub id: String,
    pub category: TemplateCategory,
    pub name: String,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<Parameter>,
    pub default_config: Value,
}

// ---------------------------------------------------------------------------
// Nodes and connections
// ---------------------------------------------------------------------------

/// Editor canvas position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A single unit of work in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    /// Unique within the owning workflow.
    pub id: String,
    /// Selects the node's behaviour; see `TemplateCatalog`.
    pub template_id: String,
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub config: Value,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl WorkflowNode {
    /// Instantiate a node from a template's default config.
    pub fn from_template(template: &NodeTemplate, position: Position) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            template_id: template.id.clone(),
            name: template.name.clone(),
            position,
            config: template.default_config.clone(),
            enabled: true,
        }
    }
}

/// Directed edge between two nodes. Descriptive only: the default executor
/// runs nodes in stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A persisted node graph plus its trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    pub trigger: Trigger,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Shared across runs without synchronisation: the last run to finish wins.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_count: u64,
}

impl Workflow {
    pub fn new(name: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            enabled: true,
            trigger,
            nodes: Vec::new(),
            connections: Vec::new(),
            variables: HashMap::new(),
            created_at: Utc::now(),
            last_run: None,
            run_count: 0,
        }
    }

    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// Remove a node and every connection touching it.
    pub fn remove_node(&mut self, node_id: &str) -> Option<WorkflowNode> {
        let index = self.nodes.iter().position(|n| n.id == node_id)?;
        let node = self.nodes.remove(index);
        self.connections
            .retain(|c| c.source_node_id != node_id && c.target_node_id != node_id);
        Some(node)
    }

    /// Add a directed connection between two existing nodes.
    ///
    /// # Errors
    /// [`EngineError::UnknownNodeReference`] if either end is not a node of
    /// this workflow.
    pub fn connect(
        &mut self,
        source_node_id: &str,
        target_node_id: &str,
        source_handle: Option<String>,
        target_handle: Option<String>,
    ) -> Result<Connection, EngineError> {
        for (node_id, side) in [(source_node_id, "source"), (target_node_id, "target")] {
            if self.node(node_id).is_none() {
                return Err(EngineError::UnknownNodeReference {
                    node_id: node_id.to_owned(),
                    side,
                });
            }
        }

        let connection = Connection {
            id: Uuid::new_v4().to_string(),
            source_node_id: source_node_id.to_owned(),
            target_node_id: target_node_id.to_owned(),
            source_handle,
            target_handle,
        };
        self.connections.push(connection.clone());
        Ok(connection)
    }

    /// Remove a connection by id; `false` if there was none.
    pub fn disconnect(&mut self, connection_id: &str) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c.id != connection_id);
        self.connections.len() != before
    }

    pub(crate) fn record_run(&mut self, at: DateTime<Utc>, variables: HashMap<String, Value>) {
        self.run_count += 1;
        self.last_run = Some(at);
        self.variables = variables;
    }
}

/// Partial update of a workflow's top-level fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub trigger: Option<Trigger>,
    pub variables: Option<HashMap<String, Value>>,
}

impl WorkflowPatch {
    pub fn apply(self, workflow: &mut Workflow) {
        if let Some(name) = self.name {
            workflow.name = name;
        }
        if let Some(description) = self.description {
            workflow.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(enabled) = self.enabled {
            workflow.enabled = enabled;
        }
        if let Some(trigger) = self.trigger {
            workflow.trigger = trigger;
        }
        if let Some(variables) = self.variables {
            workflow.variables = variables;
        }
    }
}

/// Partial update of a single node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodePatch {
    pub name: Option<String>,
    pub position: Option<Position>,
    pub config: Option<Value>,
    pub enabled: Option<bool>,
}

impl NodePatch {
    pub fn apply(self, node: &mut WorkflowNode) {
        if let Some(name) = self.name {
            node.name = name;
        }
        if let Some(position) = self.position {
            node.position = position;
        }
        if let Some(config) = self.config {
            node.config = config;
        }
        if let Some(enabled) = self.enabled {
            node.enabled = enabled;
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Possible statuses for a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running"   => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed"    => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other       => Err(format!("unknown execution status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One line of an execution's user-facing log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub message: String,
}

/// One run of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    /// Node id → that node's output.
    #[serde(default)]
    pub results: HashMap<String, Value>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Execution {
    pub fn start(workflow_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            start_time: Utc::now(),
            end_time: None,
            status: ExecutionStatus::Running,
            results: HashMap::new(),
            logs: Vec::new(),
            error: None,
        }
    }

    pub fn log(&mut self, level: LogLevel, node_id: Option<&str>, message: impl Into<String>) {
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            level,
            node_id: node_id.map(str::to_owned),
            message: message.into(),
        });
    }

    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.end_time = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.status != ExecutionStatus::Running
    }
}
