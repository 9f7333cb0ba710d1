//! `db` crate — pure persistence layer.
//!
//! Provides a keyed [`Table`] of serde rows, held in memory and optionally
//! mirrored to a JSON file. No business logic and no domain types live here;
//! the engine decides what a row is.

pub mod error;
pub mod table;

pub use error::DbError;
pub use table::Table;
