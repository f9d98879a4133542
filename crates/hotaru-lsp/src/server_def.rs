//! Per-language server definitions: extensions handled, project root
//! discovery via anchor files, and how to spawn the server binary.

use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Declares one language server integration.
#[derive(Clone)]
pub struct ServerDefinition {
	/// Stable id, used as half of the `(server_id, root)` client key.
	pub id: &'static str,
	/// File extensions (without the dot) this server handles.
	pub extensions: &'static [&'static str],
	/// Filenames that mark a directory as this project's root when walking
	/// up from the file being opened.
	pub root_anchors: &'static [&'static str],
	/// If present in a candidate root directory, this server is skipped in
	/// favor of a more specific one (e.g. `deno.json` suppresses a
	/// TypeScript server definition that would otherwise claim the file).
	pub exclusion_anchor: Option<&'static str>,
	/// Builds the command used to spawn the server.
	pub spawn: fn() -> Command,
}

impl ServerDefinition {
	/// Walks up from `file`'s parent directory looking for `root_anchors`,
	/// skipping this definition if `exclusion_anchor` is found first.
	pub async fn find_root(&self, file: &Path) -> Option<PathBuf> {
		let mut current = file.parent()?.to_path_buf();
		loop {
			if let Some(exclusion) = self.exclusion_anchor
				&& tokio::fs::metadata(current.join(exclusion)).await.is_ok()
			{
				return None;
			}
			for anchor in self.root_anchors {
				if tokio::fs::metadata(current.join(anchor)).await.is_ok() {
					return Some(current);
				}
			}
			if !current.pop() {
				return None;
			}
		}
	}

	/// Whether this definition handles `file` by extension.
	#[must_use]
	pub fn handles(&self, file: &Path) -> bool {
		file.extension()
			.and_then(|ext| ext.to_str())
			.is_some_and(|ext| self.extensions.contains(&ext))
	}
}

/// Built-in server definitions for the two most common language servers.
/// Additional servers are configuration-driven, not hardcoded.
#[must_use]
pub fn builtin_servers() -> Vec<ServerDefinition> {
	vec![
		ServerDefinition {
			id: "rust-analyzer",
			extensions: &["rs"],
			root_anchors: &["Cargo.toml"],
			exclusion_anchor: None,
			spawn: || Command::new("rust-analyzer"),
		},
		ServerDefinition {
			id: "pyright",
			extensions: &["py", "pyi"],
			root_anchors: &["pyproject.toml", "setup.py"],
			exclusion_anchor: None,
			spawn: || {
				let mut cmd = Command::new("pyright-langserver");
				cmd.arg("--stdio");
				cmd
			},
		},
	]
}
