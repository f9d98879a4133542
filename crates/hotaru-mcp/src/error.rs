//! Error types for the MCP manager.

use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
	#[error("unknown MCP server {0:?}")]
	UnknownServer(String),

	#[error("MCP server {0:?} is not connected")]
	NotConnected(String),

	#[error("OAuth state mismatch for {0:?} — possible CSRF attempt")]
	StateMismatch(String),

	#[error("missing authorization code in callback for {0:?}")]
	MissingCode(String),

	#[error("token exchange failed: {0}")]
	TokenExchange(String),

	#[error("dynamic client registration failed: {0}")]
	ClientRegistration(String),

	#[error("callback wait timed out")]
	Timeout,

	#[error("authentication cancelled")]
	Cancelled,

	#[error("JSON-RPC error {code}: {message}")]
	Rpc { code: i64, message: String },

	#[error("process I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("storage error: {0}")]
	Storage(String),
}
