//! Test doubles for [`CommandHandler`] and [`NodeBehavior`].
//!
//! Useful in unit and integration tests where the real subsystem behind a
//! command (OBS, TTS, an alert overlay) is unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::{traits::ExecutionContext, CommandError, CommandHandler, NodeBehavior, NodeError};

/// Behaviour injected into a mock at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value.
    ReturnValue(Value),
    /// Fail with a `Retryable` error (nodes) or a plain failure (commands).
    FailRetryable(String),
    /// Fail with a `Fatal` error (nodes) or a plain failure (commands).
    FailFatal(String),
}

// ---------------------------------------------------------------------------
// MockCommand
// ---------------------------------------------------------------------------

/// A mock command that records every argument list it receives.
pub struct MockCommand {
    pub behaviour: MockBehaviour,
    /// All argument lists seen by this command (in call order).
    pub calls: Arc<Mutex<Vec<Vec<Value>>>>,
}

impl MockCommand {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(value: Value) -> Self {
        Self {
            behaviour: MockBehaviour::ReturnValue(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            behaviour: MockBehaviour::FailFatal(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every argument list received so far.
    pub fn calls(&self) -> Vec<Vec<Value>> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of times this command has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandHandler for MockCommand {
    async fn call(&self, args: &[Value]) -> Result<Value, CommandError> {
        self.calls.lock().unwrap().push(args.to_vec());

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::FailRetryable(msg) | MockBehaviour::FailFatal(msg) => {
                Err(CommandError::Failed(msg.clone()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MockNode
// ---------------------------------------------------------------------------

/// A mock node behaviour that records every config it is run with.
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    pub behaviour: MockBehaviour,
    /// All configs seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockNode {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::ReturnValue(value),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailFatal(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailRetryable(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl NodeBehavior for MockNode {
    async fn execute(&self, config: &Value, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        self.calls.lock().unwrap().push(config.clone());

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::FailRetryable(msg) => Err(NodeError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(NodeError::Fatal(msg.clone())),
        }
    }
}
