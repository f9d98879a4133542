//! Persistence for MCP OAuth state: one `mcp-auth.json` file under the data
//! directory, keyed by server name, written with restricted permissions.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{McpError, McpResult};
use crate::types::AuthEntry;

const AUTH_FILE: &str = "mcp-auth.json";

pub fn auth_file_path(data_dir: &Path) -> PathBuf {
	data_dir.join(AUTH_FILE)
}

pub fn load_all(data_dir: &Path) -> McpResult<HashMap<String, AuthEntry>> {
	let path = auth_file_path(data_dir);
	if !path.exists() {
		return Ok(HashMap::new());
	}
	let contents = fs::read_to_string(&path).map_err(|e| McpError::Storage(format!("reading {}: {e}", path.display())))?;
	serde_json::from_str(&contents).map_err(|e| McpError::Storage(format!("parsing {}: {e}", path.display())))
}

pub fn save_all(data_dir: &Path, entries: &HashMap<String, AuthEntry>) -> McpResult<()> {
	fs::create_dir_all(data_dir).map_err(|e| McpError::Storage(format!("creating {}: {e}", data_dir.display())))?;

	let path = auth_file_path(data_dir);
	let contents = serde_json::to_string_pretty(entries).map_err(|e| McpError::Storage(format!("serializing auth entries: {e}")))?;

	let temp_path = path.with_extension("json.tmp");
	fs::write(&temp_path, &contents).map_err(|e| McpError::Storage(format!("writing {}: {e}", temp_path.display())))?;

	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))
			.map_err(|e| McpError::Storage(format!("setting permissions on {}: {e}", temp_path.display())))?;
	}

	fs::rename(&temp_path, &path).map_err(|e| McpError::Storage(format!("renaming {} to {}: {e}", temp_path.display(), path.display())))?;
	Ok(())
}

/// Loads the entry for `name`, discarding it if it was bound to a different
/// `server_url` (the server was reconfigured and stale tokens must not apply).
pub fn load_for_server(data_dir: &Path, name: &str, server_url: &str) -> McpResult<Option<AuthEntry>> {
	let entries = load_all(data_dir)?;
	Ok(entries.get(name).filter(|e| e.server_url == server_url).cloned())
}

pub fn save_for_server(data_dir: &Path, name: &str, entry: AuthEntry) -> McpResult<()> {
	let mut entries = load_all(data_dir)?;
	entries.insert(name.to_string(), entry);
	save_all(data_dir, &entries)
}

pub fn remove_for_server(data_dir: &Path, name: &str) -> McpResult<bool> {
	let mut entries = load_all(data_dir)?;
	let removed = entries.remove(name).is_some();
	if removed {
		save_all(data_dir, &entries)?;
	}
	Ok(removed)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn entry(url: &str) -> AuthEntry {
		AuthEntry { server_url: url.to_string(), access_token: Some("tok".to_string()), ..Default::default() }
	}

	#[test]
	fn save_and_load_round_trips() {
		let dir = TempDir::new().unwrap();
		save_for_server(dir.path(), "github", entry("https://mcp.example/github")).unwrap();

		let loaded = load_for_server(dir.path(), "github", "https://mcp.example/github").unwrap().unwrap();
		assert_eq!(loaded.access_token.as_deref(), Some("tok"));
	}

	#[test]
	fn url_change_invalidates_stored_entry() {
		let dir = TempDir::new().unwrap();
		save_for_server(dir.path(), "github", entry("https://old.example/github")).unwrap();

		let loaded = load_for_server(dir.path(), "github", "https://new.example/github").unwrap();
		assert!(loaded.is_none());
	}

	#[test]
	fn logout_removes_only_named_entry() {
		let dir = TempDir::new().unwrap();
		save_for_server(dir.path(), "github", entry("https://a")).unwrap();
		save_for_server(dir.path(), "linear", entry("https://b")).unwrap();

		assert!(remove_for_server(dir.path(), "github").unwrap());
		assert!(load_all(dir.path()).unwrap().contains_key("linear"));
		assert!(!load_all(dir.path()).unwrap().contains_key("github"));
	}

	#[cfg(unix)]
	#[test]
	fn auth_file_has_restricted_permissions() {
		use std::os::unix::fs::PermissionsExt;

		let dir = TempDir::new().unwrap();
		save_for_server(dir.path(), "github", entry("https://a")).unwrap();

		let mode = fs::metadata(auth_file_path(dir.path())).unwrap().permissions().mode();
		assert_eq!(mode & 0o777, 0o600);
	}
}
