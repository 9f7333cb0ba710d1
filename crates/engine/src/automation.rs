//! `AutomationEngine`: the facade the API and CLI talk to.
//!
//! It owns the stores, the interpreter and the workflow executor, and is the
//! boundary external event buses and timers call into. Runs started here are
//! independent: each gets its own task, failures stay inside their own
//! `RunResult` or `Execution`, and nothing serialises one run against another.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use dsl::{Diagnostic, Rule, Trigger};
use nodes::{BehaviorTable, CommandRegistry};
use serde::Serialize;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::compiler::convert_to_workflow;
use crate::executor::{ExecutorConfig, WorkflowExecutor};
use crate::interpreter::{Interpreter, RunResult};
use crate::models::{Context, Execution, LogLevel, Workflow};
use crate::scripts::ScriptStore;
use crate::templates::TemplateCatalog;
use crate::workflows::WorkflowStore;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub executor: ExecutorConfig,
    /// Finished executions kept in memory; the oldest are dropped first.
    pub history_limit: usize,
    /// Where `scripts.json` and `workflows.json` live. `None` keeps
    /// everything in memory.
    pub data_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            history_limit: 100,
            data_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// One rule of one script, run once.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRun {
    pub script_id: Uuid,
    pub rule_index: usize,
    #[serde(flatten)]
    pub result: RunResult,
}

/// Everything an event or schedule firing started.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventReport {
    pub script_runs: Vec<ScriptRun>,
    pub executions: Vec<Execution>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScheduleOwner {
    #[serde(rename_all = "camelCase")]
    Script { script_id: Uuid, rule_index: usize },
    #[serde(rename_all = "camelCase")]
    Workflow { workflow_id: Uuid },
}

/// A schedule expression some script rule or workflow is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub owner: ScheduleOwner,
    pub schedule_expr: String,
}

// ---------------------------------------------------------------------------
// Execution tracking
// ---------------------------------------------------------------------------

/// Active and finished executions under one lock, so moving an execution
/// from one to the other is a single step.
#[derive(Default)]
struct ExecutionLog {
    active: HashMap<Uuid, Execution>,
    history: VecDeque<Execution>,
}

impl ExecutionLog {
    fn finish(&mut self, execution: Execution, limit: usize) {
        self.active.remove(&execution.id);
        self.history.push_back(execution);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }
}

enum Outcome {
    Script(ScriptRun),
    Workflow(Result<Execution, EngineError>),
}

/// What a fan-out task was running, for reporting a task that died.
enum RunOwner {
    Script { script_id: Uuid, rule_index: usize },
    Workflow { workflow_id: Uuid },
}

// ---------------------------------------------------------------------------
// AutomationEngine
// ---------------------------------------------------------------------------

struct Inner {
    scripts: ScriptStore,
    workflows: WorkflowStore,
    catalog: Arc<TemplateCatalog>,
    commands: Arc<CommandRegistry>,
    interpreter: Interpreter,
    executor: WorkflowExecutor,
    executions: Mutex<ExecutionLog>,
    history_limit: usize,
}

/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct AutomationEngine {
    inner: Arc<Inner>,
}

impl AutomationEngine {
    /// Build an engine, loading persisted scripts and workflows from
    /// `config.data_dir` when one is set.
    pub async fn open(
        config: EngineConfig,
        commands: CommandRegistry,
        behaviors: BehaviorTable,
        catalog: TemplateCatalog,
    ) -> Result<Self, EngineError> {
        let catalog = Arc::new(catalog);
        let (scripts, workflows) = match &config.data_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await.map_err(db::DbError::from)?;
                (
                    ScriptStore::open(dir).await?,
                    WorkflowStore::open(dir, catalog.clone()).await?,
                )
            }
            None => (ScriptStore::in_memory(), WorkflowStore::in_memory(catalog.clone())),
        };

        let commands = Arc::new(commands);
        info!("automation engine ready with {} command(s)", commands.names().len());

        Ok(Self {
            inner: Arc::new(Inner {
                scripts,
                workflows,
                catalog,
                interpreter: Interpreter::new(commands.clone()),
                executor: WorkflowExecutor::new(commands.clone(), behaviors, config.executor),
                commands,
                executions: Mutex::new(ExecutionLog::default()),
                history_limit: config.history_limit,
            }),
        })
    }

    /// In-memory engine with the built-in behaviours and templates.
    pub fn in_memory(commands: CommandRegistry) -> Self {
        let catalog = Arc::new(TemplateCatalog::builtin());
        let commands = Arc::new(commands);
        Self {
            inner: Arc::new(Inner {
                scripts: ScriptStore::in_memory(),
                workflows: WorkflowStore::in_memory(catalog.clone()),
                catalog,
                interpreter: Interpreter::new(commands.clone()),
                executor: WorkflowExecutor::new(
                    commands.clone(),
                    BehaviorTable::builtin(),
                    ExecutorConfig::default(),
                ),
                commands,
                executions: Mutex::new(ExecutionLog::default()),
                history_limit: EngineConfig::default().history_limit,
            }),
        }
    }

    pub fn scripts(&self) -> &ScriptStore {
        &self.inner.scripts
    }

    pub fn workflows(&self) -> &WorkflowStore {
        &self.inner.workflows
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.inner.catalog
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.inner.commands
    }

    /// Syntax errors, plus warnings for commands nobody registered.
    pub fn validate(&self, code: &str) -> Vec<Diagnostic> {
        dsl::validate_with_commands(code, self.inner.commands.names())
    }

    // -----------------------------------------------------------------------
    // Scripts
    // -----------------------------------------------------------------------

    /// Run every rule of the script once, ignoring triggers ("run now").
    ///
    /// Rules run in order and the first failing rule stops the rest. The
    /// script's run statistics are bumped once whatever the outcome.
    ///
    /// # Errors
    /// [`EngineError::ScriptNotFound`], or [`EngineError::Syntax`] if the code
    /// does not parse, in which case nothing ran.
    #[instrument(skip(self, context), fields(script_id = %id))]
    pub async fn run_script(&self, id: Uuid, context: &Context) -> Result<Vec<ScriptRun>, EngineError> {
        let script = self.inner.scripts.get(id).await?;
        let program = script.program()?;

        let mut runs = Vec::with_capacity(program.rules.len());
        for (rule_index, rule) in program.rules.into_iter().enumerate() {
            let result = self.interpret(rule, context.clone()).await;
            let failed = !result.succeeded();
            runs.push(ScriptRun {
                script_id: id,
                rule_index,
                result,
            });
            if failed {
                break;
            }
        }

        self.inner.scripts.record_run(id, Utc::now()).await?;
        Ok(runs)
    }

    /// Run one rule triggered from outside and record it on the script.
    async fn run_rule(&self, script_id: Uuid, rule_index: usize, rule: Rule, context: Context) -> ScriptRun {
        let result = self.interpret(rule, context).await;
        if let Err(e) = self.inner.scripts.record_run(script_id, Utc::now()).await {
            // Deleted while running.
            warn!(script_id = %script_id, "could not record run: {}", e);
        }
        ScriptRun {
            script_id,
            rule_index,
            result,
        }
    }

    /// Interpret `rule` on its own task so a panicking handler fails this run
    /// instead of losing it.
    async fn interpret(&self, rule: Rule, context: Context) -> RunResult {
        let interpreter = self.inner.interpreter.clone();
        match tokio::spawn(async move { interpreter.execute(&rule, &context).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!("script run task failed: {}", e);
                RunResult::aborted(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Event and schedule boundary
    // -----------------------------------------------------------------------

    /// Deliver an event: every matching rule of every enabled, valid script
    /// and every enabled workflow with a matching trigger runs concurrently.
    #[instrument(skip(self, context))]
    pub async fn handle_event(&self, name: &str, context: Context) -> EventReport {
        let report = self
            .fan_out(context.clone(), |trigger| trigger.matches_event(name, &context))
            .await;
        info!(
            "event '{}' started {} script run(s) and {} workflow execution(s)",
            name,
            report.script_runs.len(),
            report.executions.len()
        );
        report
    }

    /// Every schedule expression currently bound, for an external timer to
    /// register. Disabled and invalid scripts and disabled workflows are left
    /// out.
    pub async fn schedules(&self) -> Vec<ScheduleEntry> {
        let mut entries = Vec::new();
        for script in self.inner.scripts.list().await {
            if !script.enabled {
                continue;
            }
            let Ok(program) = script.program() else { continue };
            for (rule_index, rule) in program.rules.iter().enumerate() {
                if let Some(expr) = rule.trigger.schedule_expr() {
                    entries.push(ScheduleEntry {
                        owner: ScheduleOwner::Script {
                            script_id: script.id,
                            rule_index,
                        },
                        schedule_expr: expr.to_owned(),
                    });
                }
            }
        }
        for workflow in self.inner.workflows.list().await {
            if let (true, Some(expr)) = (workflow.enabled, workflow.trigger.schedule_expr()) {
                entries.push(ScheduleEntry {
                    owner: ScheduleOwner::Workflow {
                        workflow_id: workflow.id,
                    },
                    schedule_expr: expr.to_owned(),
                });
            }
        }
        entries
    }

    /// Called by the external timer when `expr` is due.
    #[instrument(skip(self, context))]
    pub async fn fire_schedule(&self, expr: &str, context: Context) -> EventReport {
        let expr = expr.trim();
        self.fan_out(context, |trigger| trigger.schedule_expr() == Some(expr))
            .await
    }

    async fn fan_out(&self, context: Context, matches: impl Fn(&Trigger) -> bool) -> EventReport {
        let mut tasks = JoinSet::new();
        let mut owners: HashMap<task::Id, RunOwner> = HashMap::new();

        for script in self.inner.scripts.list().await {
            if !script.enabled {
                continue;
            }
            let program = match script.program() {
                Ok(program) => program,
                Err(e) => {
                    debug!(script_id = %script.id, "skipping script '{}': {}", script.name, e);
                    continue;
                }
            };
            for (rule_index, rule) in program.rules.into_iter().enumerate() {
                if !matches(&rule.trigger) {
                    continue;
                }
                let engine = self.clone();
                let context = context.clone();
                let script_id = script.id;
                let handle = tasks.spawn(async move {
                    Outcome::Script(engine.run_rule(script_id, rule_index, rule, context).await)
                });
                owners.insert(handle.id(), RunOwner::Script { script_id, rule_index });
            }
        }

        for workflow in self.inner.workflows.list().await {
            if !workflow.enabled || !matches(&workflow.trigger) {
                continue;
            }
            let engine = self.clone();
            let context = context.clone();
            let workflow_id = workflow.id;
            let handle =
                tasks.spawn(async move { Outcome::Workflow(engine.execute_workflow(workflow_id, &context).await) });
            owners.insert(handle.id(), RunOwner::Workflow { workflow_id });
        }

        let mut report = EventReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Outcome::Script(run)) => report.script_runs.push(run),
                Ok(Outcome::Workflow(Ok(execution))) => report.executions.push(execution),
                Ok(Outcome::Workflow(Err(e))) => warn!("triggered workflow did not run: {}", e),
                Err(e) => {
                    error!("run task failed: {}", e);
                    match owners.get(&e.id()) {
                        Some(&RunOwner::Script { script_id, rule_index }) => {
                            if let Err(e) = self.inner.scripts.record_run(script_id, Utc::now()).await {
                                warn!(script_id = %script_id, "could not record run: {}", e);
                            }
                            report.script_runs.push(ScriptRun {
                                script_id,
                                rule_index,
                                result: RunResult::aborted(e),
                            });
                        }
                        Some(&RunOwner::Workflow { workflow_id }) => {
                            warn!(workflow_id = %workflow_id, "triggered workflow task was lost")
                        }
                        None => {}
                    }
                }
            }
        }
        report
    }

    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Run a workflow to completion and archive the execution.
    ///
    /// The execution is listed as active while it runs and moves to the
    /// history when it finishes, failed or not. Run statistics and variables
    /// are written back in both cases.
    ///
    /// # Errors
    /// [`EngineError::WorkflowNotFound`]. Node failures are not errors here;
    /// they are recorded on the returned execution.
    #[instrument(skip(self, context), fields(workflow_id = %id))]
    pub async fn execute_workflow(&self, id: Uuid, context: &Context) -> Result<Execution, EngineError> {
        let workflow = self.inner.workflows.get(id).await?;

        let started = Execution::start(workflow.id);
        self.executions().active.insert(started.id, started.clone());

        let initial_variables = workflow.variables.clone();
        let engine = self.clone();
        let context = context.clone();
        let mut running = started.clone();
        let task = tokio::spawn(async move {
            let variables = engine.inner.executor.run(&workflow, &mut running, &context).await;
            (running, variables)
        });
        let (execution, variables) = match task.await {
            Ok(finished) => finished,
            Err(e) => {
                error!("execution {} task failed: {}", started.id, e);
                let mut execution = started;
                let message = format!("execution aborted: {e}");
                execution.log(LogLevel::Error, None, message.clone());
                execution.fail(message);
                (execution, initial_variables)
            }
        };

        if let Err(e) = self.inner.workflows.record_run(id, Utc::now(), variables).await {
            warn!("could not record run of workflow {}: {}", id, e);
        }
        self.executions().finish(execution.clone(), self.inner.history_limit);

        info!("execution {} finished with status {}", execution.id, execution.status);
        Ok(execution)
    }

    pub fn active_executions(&self) -> Vec<Execution> {
        self.executions().active.values().cloned().collect()
    }

    /// Finished executions, oldest first, optionally for one workflow only.
    pub fn execution_history(&self, workflow_id: Option<Uuid>) -> Vec<Execution> {
        self.executions()
            .history
            .iter()
            .filter(|e| workflow_id.map_or(true, |id| e.workflow_id == id))
            .cloned()
            .collect()
    }

    fn executions(&self) -> MutexGuard<'_, ExecutionLog> {
        self.inner.executions.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Conversion and import/export
    // -----------------------------------------------------------------------

    /// Generate a workflow from the script's first rule and store it.
    pub async fn convert_script(&self, id: Uuid) -> Result<Workflow, EngineError> {
        let script = self.inner.scripts.get(id).await?;
        let workflow = convert_to_workflow(&script, &self.inner.catalog)?;
        self.inner.workflows.insert(workflow).await
    }

    pub async fn export_workflow(&self, id: Uuid) -> Result<String, EngineError> {
        self.inner.workflows.export(id).await
    }

    /// `None` when the JSON is not a workflow.
    pub async fn import_workflow(&self, json: &str) -> Option<Workflow> {
        self.inner.workflows.import(json).await
    }
}
