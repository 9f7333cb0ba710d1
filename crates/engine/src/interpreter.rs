//! Program executor — runs one rule's actions against the command registry.
//!
//! Semantics of a single run:
//! - actions execute strictly in order, each finishing before the next starts;
//! - string arguments get `{{key}}` placeholders filled from the context;
//! - `wait(seconds)` suspends only this run;
//! - an unknown command is logged and skipped;
//! - the first handler error aborts the rest of the run and is reported in the
//!   [`RunResult`], never raised.

use std::sync::Arc;
use std::time::Duration;

use dsl::{ActionCall, ArgValue, Rule};
use nodes::{CommandRegistry, Dispatch};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::models::Context;
use crate::placeholders::render;

/// A command handler failed; the rest of the run was skipped.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("action #{index} '{command}' failed: {message}")]
pub struct ActionError {
    /// Position of the failing action in the rule.
    pub index: usize,
    pub command: String,
    pub message: String,
}

/// Outcome of running one rule.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Actions that finished, including skipped unknown commands and waits.
    pub completed_actions: usize,
    /// Unknown command names, in the order they were hit.
    pub unknown_commands: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionError>,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// The run's task died before it could report; nothing is known to
    /// have completed.
    pub fn aborted(reason: impl std::fmt::Display) -> Self {
        Self {
            error: Some(ActionError {
                index: 0,
                command: String::new(),
                message: format!("run aborted: {reason}"),
            }),
            ..Self::default()
        }
    }
}

/// Executes rules against a shared [`CommandRegistry`].
#[derive(Clone)]
pub struct Interpreter {
    registry: Arc<CommandRegistry>,
}

impl Interpreter {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Run `rule`'s actions in order with `context`.
    #[instrument(skip_all, fields(actions = rule.actions.len()))]
    pub async fn execute(&self, rule: &Rule, context: &Context) -> RunResult {
        let mut result = RunResult::default();

        for (index, action) in rule.actions.iter().enumerate() {
            let args = render_args(action, context);

            let outcome = if action.command == "wait" {
                wait(&args).await
            } else {
                let json_args: Vec<Value> = args.iter().map(Value::from).collect();
                match self.registry.dispatch(&action.command, &json_args).await {
                    Ok(Dispatch::Handled(output)) => {
                        debug!("'{}' returned {}", action.command, output);
                        Ok(())
                    }
                    Ok(Dispatch::Unknown) => {
                        result.unknown_commands.push(action.command.clone());
                        Ok(())
                    }
                    Err(e) => Err(e.to_string()),
                }
            };

            if let Err(message) = outcome {
                warn!("action #{} '{}' failed, aborting run: {}", index, action.command, message);
                result.error = Some(ActionError {
                    index,
                    command: action.command.clone(),
                    message,
                });
                break;
            }
            result.completed_actions += 1;
        }

        result
    }
}

fn render_args(action: &ActionCall, context: &Context) -> Vec<ArgValue> {
    action
        .args
        .iter()
        .map(|arg| match arg {
            ArgValue::String(s) => ArgValue::String(render(s, context)),
            other => other.clone(),
        })
        .collect()
}

/// Built-in `wait(seconds)`.
async fn wait(args: &[ArgValue]) -> Result<(), String> {
    let seconds = args
        .first()
        .and_then(ArgValue::as_f64)
        .ok_or_else(|| "wait expects a number of seconds".to_string())?;
    let duration =
        Duration::try_from_secs_f64(seconds).map_err(|_| format!("invalid wait of {seconds} seconds"))?;

    debug!("waiting {seconds}s");
    tokio::time::sleep(duration).await;
    Ok(())
}
