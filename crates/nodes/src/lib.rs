//! `nodes` crate — the dispatch boundary between the engine and the outside world.
//!
//! Two dispatch tables live here:
//! - [`CommandRegistry`]: command name → [`CommandHandler`]. Populated at
//!   startup by the subsystems that own scenes, sounds, alerts, TTS and so on.
//!   Script actions and several workflow nodes call into it by name.
//! - [`BehaviorTable`]: node template id → [`NodeBehavior`]. Ships the
//!   built-in workflow node behaviours and accepts more at startup.
//!
//! Neither table is a process-wide global; both are built once and passed to
//! the engine.

pub mod behaviors;
pub mod error;
pub mod mock;
pub mod registry;
pub mod traits;

pub use behaviors::BehaviorTable;
pub use error::{CommandError, NodeError};
pub use registry::{CommandRegistry, Dispatch};
pub use traits::{CommandHandler, ExecutionContext, FnCommand, NodeBehavior};
