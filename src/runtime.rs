//! Runtime for executing dialogues
//!
//! Drives the pure state machine: loads the thread's checkpoint, performs
//! each effect a transition returns and feeds the resulting events back in.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::DialogueRuntime;
pub use traits::*;

use crate::checkpoint::{CheckpointError, Checkpointer, MemoryCheckpointer, SqliteCheckpointer};
use crate::cli::StdioUserIo;
use crate::config::Environment;
use crate::db::Database;
use crate::generator::LlmResponseGenerator;
use std::sync::Arc;
use thiserror::Error;

/// Type alias for the interactive runtime with concrete implementations
pub type ProductionRuntime =
    DialogueRuntime<Arc<dyn Checkpointer>, LlmResponseGenerator, StdioUserIo>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to load checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// How a run finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The thread reached `End` (now or in an earlier run)
    Ended,
    /// Input closed while the thread was waiting; it can be resumed later
    InputClosed,
}

/// Pick the checkpoint backend for the deployment mode.
///
/// `db` must be present in production; without it the in-memory backend is
/// used and a warning is logged.
pub fn select_checkpointer(environment: Environment, db: Option<Database>) -> Arc<dyn Checkpointer> {
    match (environment, db) {
        (Environment::Production, Some(db)) => {
            tracing::info!("Using SQLite checkpointer for production");
            Arc::new(SqliteCheckpointer::new(db))
        }
        (Environment::Production, None) => {
            tracing::warn!("No database available, falling back to in-memory checkpointer");
            Arc::new(MemoryCheckpointer::new())
        }
        (Environment::Development, _) => {
            tracing::info!("Using in-memory checkpointer for development");
            Arc::new(MemoryCheckpointer::new())
        }
    }
}
