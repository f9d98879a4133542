//! Error types for the LSP manager.

/// Errors surfaced by the LSP client and manager.
#[derive(Debug, thiserror::Error)]
pub enum LspError {
	/// I/O failure talking to the child process.
	#[error("lsp io error: {0}")]
	Io(#[from] std::io::Error),
	/// A frame's body failed to (de)serialize as JSON.
	#[error("lsp json error: {0}")]
	Json(#[from] serde_json::Error),
	/// The stdio framing was malformed.
	#[error("lsp framing error: {0}")]
	Framing(String),
	/// The server for `(server_id, root)` is marked broken for this run.
	#[error("server {server_id} at {root} is marked broken")]
	Broken {
		/// The server definition id.
		server_id: String,
		/// The resolved project root.
		root: String,
	},
	/// No server definition handles this file's extension.
	#[error("no server definition for extension {0:?}")]
	NoServerForExtension(Option<String>),
	/// `initialize` did not complete within the timeout.
	#[error("lsp initialize timed out")]
	InitializeTimeout,
	/// A request awaiter was dropped without a response (e.g. on shutdown).
	#[error("lsp request cancelled")]
	Cancelled,
}

/// Convenience alias.
pub type LspResult<T> = Result<T, LspError>;
