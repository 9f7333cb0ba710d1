//! Node- and command-level error types.

use thiserror::Error;

/// Errors returned by a [`CommandHandler`](crate::CommandHandler).
#[derive(Debug, Error)]
pub enum CommandError {
    /// The handler rejected its argument list.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The handler ran and failed.
    #[error("{0}")]
    Failed(String),

    /// Anything an external subsystem reports through `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors returned by a node's `execute` method.
///
/// The executor uses the variant to decide retry behaviour:
/// - `Retryable` — re-run with exponential back-off, up to the configured limit.
/// - `Fatal`     — the execution is immediately marked as failed.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// Transient failure; the executor may re-try the node.
    #[error("retryable node error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal node error: {0}")]
    Fatal(String),
}

impl From<CommandError> for NodeError {
    fn from(err: CommandError) -> Self {
        NodeError::Fatal(err.to_string())
    }
}
