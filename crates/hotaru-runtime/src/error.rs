//! Runtime-level error taxonomy.

use thiserror::Error;

/// Errors surfaced by the runtime container or session loop.
#[derive(Debug, Error)]
pub enum RuntimeError {
	/// A critical subsystem (MCP) failed to start; startup is rolled back.
	#[error("critical subsystem {subsystem} failed to start: {source}")]
	SubsystemFailed {
		/// The subsystem's name, as it appears in [`crate::Health`].
		subsystem: &'static str,
		/// Underlying failure.
		#[source]
		source: Box<dyn std::error::Error + Send + Sync>,
	},

	/// No session exists for the given id.
	#[error("unknown session {0:?}")]
	UnknownSession(String),

	/// Undo was requested but the session has no turn to drop.
	#[error("nothing to undo for session {0:?}")]
	NothingToUndo(String),

	/// Redo was requested but the session's redo stack is empty.
	#[error("nothing to redo for session {0:?}")]
	NothingToRedo(String),

	/// A new turn was requested while the runtime is shutting down.
	#[error("runtime is shutting down, not accepting new turns")]
	ShuttingDown,

	#[error(transparent)]
	Storage(#[from] hotaru_storage::StorageError),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Config(#[from] hotaru_config::ConfigError),

	#[error(transparent)]
	Tool(#[from] hotaru_tool::ToolError),
}

/// Convenience alias for runtime results.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
