//! Error type for tool execution.

use hotaru_permission::AskError;
use thiserror::Error;

/// Errors that can surface from the tool envelope or a tool body.
///
/// Every variant except `Validation` is returned as text
/// into the conversation rather than aborting the session loop; the caller
/// (the session loop) is responsible for that routing decision, this crate
/// only classifies the failure.
#[derive(Debug, Error)]
pub enum ToolError {
	#[error("unknown tool {0:?}")]
	UnknownTool(String),

	#[error("invalid arguments: {0}")]
	Validation(String),

	#[error("permission denied: {0}")]
	Permission(#[from] AskError),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("lsp error: {0}")]
	Lsp(#[from] hotaru_lsp::LspError),

	#[error("{0}")]
	Other(String),
}

/// Result alias for this crate. Named `ExecResult` (not `ToolResult`) since
/// [`crate::ToolResult`] is the tool's output-value type, not a `Result`.
pub type ExecResult<T> = Result<T, ToolError>;
