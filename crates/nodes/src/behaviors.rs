//! Built-in workflow node behaviours and the template-id → behaviour table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::traits::ExecutionContext;
use crate::{Dispatch, NodeBehavior, NodeError};

/// Maps node template ids to behaviours.
#[derive(Clone, Default)]
pub struct BehaviorTable {
    behaviors: HashMap<String, Arc<dyn NodeBehavior>>,
}

impl BehaviorTable {
    /// An empty table (for testing).
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in behaviours.
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.register(
            "switch-scene",
            Arc::new(ForwardCommand::new("switchScene", &["sceneName"])),
        );
        table.register(
            "play-sound",
            Arc::new(ForwardCommand::new("playSound", &["sound", "volume"])),
        );
        table.register(
            "show-alert",
            Arc::new(ForwardCommand::new("showAlert", &["title", "message", "duration"])),
        );
        table.register("speak", Arc::new(ForwardCommand::new("speak", &["text"])));
        table.register("delay", Arc::new(Delay));
        table.register("random-number", Arc::new(RandomNumber));
        table.register("set-variable", Arc::new(SetVariable));
        table.register("log", Arc::new(LogMessage));
        table
    }

    pub fn register(&mut self, template_id: impl Into<String>, behavior: Arc<dyn NodeBehavior>) {
        self.behaviors.insert(template_id.into(), behavior);
    }

    pub fn get(&self, template_id: &str) -> Option<&Arc<dyn NodeBehavior>> {
        self.behaviors.get(template_id)
    }

    pub fn contains(&self, template_id: &str) -> bool {
        self.behaviors.contains_key(template_id)
    }
}

fn number_field(config: &Value, key: &str) -> Option<f64> {
    match config.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_field<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

// ---------------------------------------------------------------------------
// ForwardCommand
// ---------------------------------------------------------------------------

/// Turns named config fields into positional arguments and dispatches a command.
pub struct ForwardCommand {
    command: &'static str,
    params: &'static [&'static str],
}

impl ForwardCommand {
    pub fn new(command: &'static str, params: &'static [&'static str]) -> Self {
        Self { command, params }
    }

    /// Config fields in parameter order; missing trailing fields are dropped,
    /// missing interior ones become `null`.
    fn args(&self, config: &Value) -> Vec<Value> {
        let mut args: Vec<Value> = self
            .params
            .iter()
            .map(|p| config.get(*p).cloned().unwrap_or(Value::Null))
            .collect();
        while args.last().is_some_and(Value::is_null) {
            args.pop();
        }
        args
    }
}

#[async_trait]
impl NodeBehavior for ForwardCommand {
    async fn execute(&self, config: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let args = self.args(config);
        match ctx.commands.dispatch(self.command, &args).await? {
            Dispatch::Handled(output) => Ok(output),
            Dispatch::Unknown => Ok(Value::Null),
        }
    }
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// Pauses this run for `seconds`.
pub struct Delay;

#[async_trait]
impl NodeBehavior for Delay {
    async fn execute(&self, config: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let seconds = number_field(config, "seconds").unwrap_or(0.0);
        let wait = Duration::try_from_secs_f64(seconds)
            .map_err(|_| NodeError::Fatal(format!("invalid delay of {seconds} seconds")))?;
        if !wait.is_zero() {
            info!("delay node pausing for {:?} (execution: {})", wait, ctx.execution_id);
            tokio::time::sleep(wait).await;
        }
        Ok(json!({ "waitedMs": wait.as_millis() as u64 }))
    }
}

// ---------------------------------------------------------------------------
// RandomNumber
// ---------------------------------------------------------------------------

/// Integer in `[min, max]` (defaults 1 and 100), optionally stored in a variable.
pub struct RandomNumber;

#[async_trait]
impl NodeBehavior for RandomNumber {
    async fn execute(&self, config: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let mut min = number_field(config, "min").unwrap_or(1.0) as i64;
        let mut max = number_field(config, "max").unwrap_or(100.0) as i64;
        if min > max {
            std::mem::swap(&mut min, &mut max);
        }

        let value = rand::thread_rng().gen_range(min..=max);
        if let Some(name) = string_field(config, "variable").filter(|n| !n.is_empty()) {
            ctx.set_variable(name, json!(value));
        }
        Ok(json!({ "value": value }))
    }
}

// ---------------------------------------------------------------------------
// SetVariable
// ---------------------------------------------------------------------------

/// Writes `value` into the run's variables under `name`.
pub struct SetVariable;

#[async_trait]
impl NodeBehavior for SetVariable {
    async fn execute(&self, config: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let name = string_field(config, "name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| NodeError::Fatal("set-variable requires a 'name'".into()))?;
        let value = config.get("value").cloned().unwrap_or(Value::Null);
        ctx.set_variable(name, value.clone());
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// LogMessage
// ---------------------------------------------------------------------------

pub struct LogMessage;

#[async_trait]
impl NodeBehavior for LogMessage {
    async fn execute(&self, config: &Value, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let message = string_field(config, "message").unwrap_or_default();
        match string_field(config, "level") {
            Some("warn") | Some("warning") => warn!(workflow_id = %ctx.workflow_id, "{message}"),
            _ => info!(workflow_id = %ctx.workflow_id, "{message}"),
        }
        Ok(json!({ "message": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCommand;
    use crate::CommandRegistry;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn ctx_with(commands: CommandRegistry) -> ExecutionContext {
        ExecutionContext::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            HashMap::new(),
            HashMap::new(),
            Arc::new(commands),
        )
    }

    #[tokio::test]
    async fn forward_command_maps_config_to_positional_args() {
        let alert = Arc::new(MockCommand::returning(json!("shown")));
        let ctx = ctx_with(CommandRegistry::new().with("showAlert", alert.clone()));
        let table = BehaviorTable::builtin();

        let out = table
            .get("show-alert")
            .unwrap()
            .execute(&json!({ "title": "Hi", "message": "msg", "duration": 5 }), &ctx)
            .await
            .unwrap();

        assert_eq!(out, json!("shown"));
        assert_eq!(alert.calls(), vec![vec![json!("Hi"), json!("msg"), json!(5)]]);
    }

    #[tokio::test]
    async fn forward_command_drops_missing_trailing_args() {
        let sound = Arc::new(MockCommand::returning(Value::Null));
        let ctx = ctx_with(CommandRegistry::new().with("playSound", sound.clone()));

        BehaviorTable::builtin()
            .get("play-sound")
            .unwrap()
            .execute(&json!({ "sound": "airhorn" }), &ctx)
            .await
            .unwrap();

        assert_eq!(sound.calls(), vec![vec![json!("airhorn")]]);
    }

    #[tokio::test]
    async fn forward_to_unregistered_command_is_a_no_op() {
        let ctx = ctx_with(CommandRegistry::new());
        let out = BehaviorTable::builtin()
            .get("switch-scene")
            .unwrap()
            .execute(&json!({ "sceneName": "BRB" }), &ctx)
            .await
            .unwrap();
        assert_eq!(out, Value::Null);
        assert_eq!(ctx.commands.unknown_dispatches(), 1);
    }

    #[tokio::test]
    async fn forwarded_command_failure_is_fatal() {
        let ctx = ctx_with(CommandRegistry::new().with("speak", Arc::new(MockCommand::failing("tts offline"))));
        let err = BehaviorTable::builtin()
            .get("speak")
            .unwrap()
            .execute(&json!({ "text": "hello" }), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Fatal(msg) if msg == "tts offline"));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_sleeps_for_configured_seconds() {
        let ctx = ctx_with(CommandRegistry::new());
        let start = tokio::time::Instant::now();
        let out = Delay.execute(&json!({ "seconds": 1.5 }), &ctx).await.unwrap();
        assert_eq!(out, json!({ "waitedMs": 1500 }));
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn delay_rejects_negative_durations() {
        let ctx = ctx_with(CommandRegistry::new());
        assert!(Delay.execute(&json!({ "seconds": -1 }), &ctx).await.is_err());
    }

    #[tokio::test]
    async fn random_number_respects_bounds_and_stores_variable() {
        let ctx = ctx_with(CommandRegistry::new());
        for _ in 0..50 {
            let out = RandomNumber
                .execute(&json!({ "min": 10, "max": 3, "variable": "roll" }), &ctx)
                .await
                .unwrap();
            let value = out["value"].as_i64().unwrap();
            assert!((3..=10).contains(&value));
            assert_eq!(ctx.variables_snapshot()["roll"], json!(value));
        }
    }

    #[tokio::test]
    async fn set_variable_requires_a_name() {
        let ctx = ctx_with(CommandRegistry::new());
        assert!(SetVariable.execute(&json!({ "value": 1 }), &ctx).await.is_err());

        SetVariable
            .execute(&json!({ "name": "mood", "value": "hype" }), &ctx)
            .await
            .unwrap();
        assert_eq!(ctx.variables_snapshot()["mood"], json!("hype"));
    }

    #[tokio::test]
    async fn delay_rejects_durations_it_cannot_represent() {
        let ctx = ctx_with(CommandRegistry::new());
        for seconds in [json!(1e30), json!(-1), json!(f64::MAX)] {
            let err = Delay.execute(&json!({ "seconds": seconds }), &ctx).await.unwrap_err();
            assert!(matches!(err, NodeError::Fatal(ref m) if m.contains("invalid delay")), "{err}");
        }
    }
}
