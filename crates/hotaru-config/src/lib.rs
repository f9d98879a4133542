//! Layered `hotaru.json` configuration loading and merge.
//!
//! Four candidate files are read, in precedence order lowest to highest:
//! user config dir, project root, project's `.hotaru/`, managed config dir.
//! Each is optional; missing files contribute nothing. Every file is
//! preprocessed with `{env:VAR}` substitution and JSONC comment/trailing-
//! comma stripping before `serde_json` parses it.

mod error;
mod jsonc;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use types::{AgentEntry, Config, McpServerEntry, OAuthEndpoints, RuleAction, RuleEntry};

use std::path::{Path, PathBuf};

/// The file name every layer looks for.
pub const CONFIG_FILE_NAME: &str = "hotaru.json";

/// Where each config layer is found, resolved from the environment and a
/// project directory: user, project, project-local override, and an
/// optionally managed layer, plus `HOTARU_*` environment overrides for test
/// isolation.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
	pub user: Option<PathBuf>,
	pub project: PathBuf,
	pub project_dotdir: PathBuf,
	pub managed: Option<PathBuf>,
}

impl ConfigPaths {
	/// Resolves the four layer locations for `project_root`, honouring
	/// `HOTARU_CONFIG_DIR` (overrides the user layer) and
	/// `HOTARU_TEST_MANAGED_CONFIG_DIR` (overrides the managed layer) for
	/// reproducible tests.
	#[must_use]
	pub fn resolve(project_root: &Path) -> Self {
		let user = std::env::var_os("HOTARU_CONFIG_DIR")
			.map(PathBuf::from)
			.or_else(|| dirs::config_dir().map(|d| d.join("hotaru")))
			.map(|d| d.join(CONFIG_FILE_NAME));

		let managed = std::env::var_os("HOTARU_TEST_MANAGED_CONFIG_DIR").map(|d| PathBuf::from(d).join(CONFIG_FILE_NAME));

		Self {
			user,
			project: project_root.join(CONFIG_FILE_NAME),
			project_dotdir: project_root.join(".hotaru").join(CONFIG_FILE_NAME),
			managed,
		}
	}
}

/// Loads and merges every present layer for `project_root`. Returns the
/// built-in empty `Config` if no layer exists. Honours
/// `HOTARU_DISABLE_PROJECT_CONFIG` by skipping the `project`/`project_dotdir`
/// layers, and `HOTARU_CONFIG_CONTENT` as an inline override applied after
/// every file layer (used by tests that don't want to touch disk at all).
pub fn load(project_root: &Path) -> ConfigResult<Config> {
	let paths = ConfigPaths::resolve(project_root);
	let mut merged = Config::default();

	if let Some(user) = &paths.user {
		if let Some(layer) = load_layer(user)? {
			merged.merge(layer);
		}
	}

	let skip_project = std::env::var_os("HOTARU_DISABLE_PROJECT_CONFIG").is_some();
	if !skip_project {
		if let Some(layer) = load_layer(&paths.project)? {
			merged.merge(layer);
		}
		if let Some(layer) = load_layer(&paths.project_dotdir)? {
			merged.merge(layer);
		}
	}

	if let Some(managed) = &paths.managed {
		if let Some(layer) = load_layer(managed)? {
			merged.merge(layer);
		}
	}

	if let Ok(inline) = std::env::var("HOTARU_CONFIG_CONTENT") {
		let layer = parse_content(&inline, "HOTARU_CONFIG_CONTENT")?;
		merged.merge(layer);
	}

	Ok(merged)
}

/// Reads and parses one config file, returning `Ok(None)` if it does not
/// exist.
fn load_layer(path: &Path) -> ConfigResult<Option<Config>> {
	let content = match std::fs::read_to_string(path) {
		Ok(content) => content,
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
		Err(source) => {
			return Err(ConfigError::Io {
				path: path.to_path_buf(),
				source,
			});
		}
	};
	parse_content(&content, &path.display().to_string()).map(Some)
}

fn parse_content(content: &str, path_hint: &str) -> ConfigResult<Config> {
	let substituted = jsonc::substitute_env(content, path_hint)?;
	let stripped = jsonc::strip_jsonc(&substituted);
	serde_json::from_str(&stripped).map_err(|source| ConfigError::Json {
		path: PathBuf::from(path_hint),
		source,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn missing_layers_yield_default_config() {
		let dir = tempdir().unwrap();
		unsafe {
			std::env::remove_var("HOTARU_CONFIG_DIR");
			std::env::remove_var("HOTARU_TEST_MANAGED_CONFIG_DIR");
			std::env::remove_var("HOTARU_CONFIG_CONTENT");
		}
		let config = load(dir.path()).unwrap();
		assert!(config.permission.is_empty());
		assert!(config.mcp.is_empty());
	}

	#[test]
	fn project_layer_is_read_and_parsed_as_jsonc() {
		let dir = tempdir().unwrap();
		std::fs::write(
			dir.path().join(CONFIG_FILE_NAME),
			r#"{
				// permission rules
				"permission": [
					{ "permission": "bash", "pattern": "*", "action": "ask" },
				]
			}"#,
		)
		.unwrap();
		unsafe {
			std::env::remove_var("HOTARU_CONFIG_DIR");
			std::env::remove_var("HOTARU_TEST_MANAGED_CONFIG_DIR");
			std::env::remove_var("HOTARU_CONFIG_CONTENT");
		}
		let config = load(dir.path()).unwrap();
		assert_eq!(config.permission.len(), 1);
		assert_eq!(config.permission[0].permission, "bash");
	}

	#[test]
	fn managed_layer_is_merged_last_and_wins_on_map_keys() {
		let dir = tempdir().unwrap();
		let managed_dir = tempdir().unwrap();
		std::fs::write(
			dir.path().join(CONFIG_FILE_NAME),
			r#"{"mcp": {"docs": {"type": "remote", "url": "https://project.example/mcp"}}}"#,
		)
		.unwrap();
		std::fs::write(
			managed_dir.path().join(CONFIG_FILE_NAME),
			r#"{"mcp": {"docs": {"type": "remote", "url": "https://managed.example/mcp"}}}"#,
		)
		.unwrap();
		unsafe {
			std::env::remove_var("HOTARU_CONFIG_DIR");
			std::env::set_var("HOTARU_TEST_MANAGED_CONFIG_DIR", managed_dir.path());
			std::env::remove_var("HOTARU_CONFIG_CONTENT");
		}
		let config = load(dir.path()).unwrap();
		match &config.mcp["docs"] {
			McpServerEntry::Remote { url, .. } => assert_eq!(url, "https://managed.example/mcp"),
			McpServerEntry::Local { .. } => panic!("expected remote entry"),
		}
		unsafe {
			std::env::remove_var("HOTARU_TEST_MANAGED_CONFIG_DIR");
		}
	}

	#[test]
	fn disable_project_config_skips_project_layers() {
		let dir = tempdir().unwrap();
		std::fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{"instructions": ["NOTES.md"]}"#).unwrap();
		unsafe {
			std::env::remove_var("HOTARU_CONFIG_DIR");
			std::env::remove_var("HOTARU_TEST_MANAGED_CONFIG_DIR");
			std::env::remove_var("HOTARU_CONFIG_CONTENT");
			std::env::set_var("HOTARU_DISABLE_PROJECT_CONFIG", "1");
		}
		let config = load(dir.path()).unwrap();
		assert!(config.instructions.is_empty());
		unsafe {
			std::env::remove_var("HOTARU_DISABLE_PROJECT_CONFIG");
		}
	}
}
