//! Command registry — the name → handler dispatch table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::{CommandError, CommandHandler};

/// Outcome of a dispatch that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// A handler ran and returned this value.
    Handled(Value),
    /// No handler is registered under the name; nothing ran.
    Unknown,
}

/// Maps command names to handlers.
///
/// Built at startup, then shared read-only (behind an `Arc`) by every run.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    unknown_dispatches: AtomicU64,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            debug!("command '{}' re-registered", name);
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        self.register(name, handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Look up `name` and run its handler.
    ///
    /// An unknown name is not an error: it is logged, counted, and reported as
    /// [`Dispatch::Unknown`].
    ///
    /// # Errors
    /// Whatever the handler returns.
    pub async fn dispatch(&self, name: &str, args: &[Value]) -> Result<Dispatch, CommandError> {
        let Some(handler) = self.handlers.get(name) else {
            self.unknown_dispatches.fetch_add(1, Ordering::Relaxed);
            warn!("unknown command '{}' ignored", name);
            return Ok(Dispatch::Unknown);
        };

        debug!("dispatching '{}' with {} argument(s)", name, args.len());
        handler.call(args).await.map(Dispatch::Handled)
    }

    /// How many dispatches hit an unregistered name since startup.
    pub fn unknown_dispatches(&self) -> u64 {
        self.unknown_dispatches.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .field("unknown_dispatches", &self.unknown_dispatches())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCommand;
    use serde_json::json;

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let speak = Arc::new(MockCommand::returning(json!("spoken")));
        let registry = CommandRegistry::new().with("speak", speak.clone());

        let result = registry.dispatch("speak", &[json!("hi")]).await.unwrap();
        assert_eq!(result, Dispatch::Handled(json!("spoken")));
        assert_eq!(speak.calls(), vec![vec![json!("hi")]]);
    }

    #[tokio::test]
    async fn unknown_command_is_counted_not_raised() {
        let registry = CommandRegistry::new();
        assert_eq!(registry.dispatch("dance", &[]).await.unwrap(), Dispatch::Unknown);
        assert_eq!(registry.dispatch("dance", &[]).await.unwrap(), Dispatch::Unknown);
        assert_eq!(registry.unknown_dispatches(), 2);
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let registry =
            CommandRegistry::new().with("record", Arc::new(MockCommand::failing("disk full")));
        let err = registry.dispatch("record", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn names_are_sorted() {
        let registry = CommandRegistry::new()
            .with("speak", Arc::new(MockCommand::returning(Value::Null)))
            .with("nextScene", Arc::new(MockCommand::returning(Value::Null)));
        assert_eq!(registry.names(), vec!["nextScene", "speak"]);
        assert!(registry.contains("speak"));
        assert!(!registry.contains("dance"));
    }
}
