//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("row not found")]
    NotFound,

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt table data: {0}")]
    Serde(#[from] serde_json::Error),
}
