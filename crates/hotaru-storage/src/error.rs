//! Storage error taxonomy.

use crate::key::Key;

/// Errors surfaced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
	/// The key does not exist. Callers distinguish this from I/O failure.
	#[error("key not found: {0}")]
	NotFound(Key),

	/// Filesystem I/O failed.
	#[error("storage i/o error at {path}: {source}")]
	Io {
		/// Path the failing operation targeted.
		path: std::path::PathBuf,
		/// Underlying I/O error.
		#[source]
		source: std::io::Error,
	},

	/// Stored bytes did not parse as JSON, or a value failed to serialize.
	#[error("storage serialization error: {0}")]
	Serde(#[from] serde_json::Error),

	/// A transaction referenced an op list that could not be recovered.
	#[error("transaction {0} is corrupt: {1}")]
	CorruptTransaction(String, String),
}

/// Convenience alias for storage results.
pub type StorageResult<T> = Result<T, StorageError>;
