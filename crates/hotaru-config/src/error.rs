//! Error type for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or merging configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("I/O error reading {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid JSON in {path}: {source}")]
	Json {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("unresolved environment substitution {0:?} ({1} is not set)")]
	MissingEnvVar(String, String),
}

/// Result alias for this crate.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
