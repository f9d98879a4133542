//! Lists files under the working directory matching a glob pattern.

use async_trait::async_trait;
use globset::Glob;
use serde_json::{Value, json};

use crate::context::{ToolContext, ToolResult};
use crate::error::{ExecResult, ToolError};
use crate::registry::Tool;

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
	fn id(&self) -> &'static str {
		"glob"
	}

	fn description(&self) -> &'static str {
		"Lists files under the working directory matching a glob pattern."
	}

	fn parameters_schema(&self) -> Value {
		json!({"type": "object", "properties": {"pattern": {"type": "string"}}, "required": ["pattern"]})
	}

	fn required_permissions(&self, _args: &Value) -> Vec<(String, String)> {
		Vec::new()
	}

	fn required_fields(&self) -> &'static [&'static str] {
		&["pattern"]
	}

	async fn execute(&self, args: Value, ctx: &ToolContext) -> ExecResult<ToolResult> {
		let pattern = args["pattern"].as_str().ok_or_else(|| ToolError::Validation("pattern must be a string".to_string()))?;
		let matcher = Glob::new(pattern).map_err(|e| ToolError::Validation(e.to_string()))?.compile_matcher();

		let mut matches = Vec::new();
		let mut stack = vec![ctx.directory.clone()];
		while let Some(dir) = stack.pop() {
			let mut entries = tokio::fs::read_dir(&dir).await?;
			while let Some(entry) = entries.next_entry().await? {
				let path = entry.path();
				if entry.file_type().await?.is_dir() {
					stack.push(path);
					continue;
				}
				if let Ok(relative) = path.strip_prefix(&ctx.directory)
					&& matcher.is_match(relative)
				{
					matches.push(relative.display().to_string());
				}
			}
		}
		matches.sort();
		Ok(ToolResult::text(pattern, matches.join("\n")))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hotaru_permission::PermissionService;
	use std::path::PathBuf;

	#[tokio::test]
	async fn finds_files_matching_the_pattern() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::create_dir_all(dir.path().join("src")).await.unwrap();
		tokio::fs::write(dir.path().join("src/main.rs"), "").await.unwrap();
		tokio::fs::write(dir.path().join("README.md"), "").await.unwrap();

		let ctx = ToolContext {
			session_id: "s1".into(),
			message_id: "m1".into(),
			agent: "main".into(),
			call_id: "c1".into(),
			directory: dir.path().to_path_buf(),
			worktree: PathBuf::from("/"),
			metadata: Value::Null,
			aborted: crate::context::AbortFlag::new(),
			ruleset: Vec::new(),
			permission: PermissionService::start(hotaru_bus::Bus::new()),
			metadata_sink: crate::context::MetadataSink::new().0,
		};
		let result = GlobTool.execute(json!({"pattern": "**/*.rs"}), &ctx).await.unwrap();
		assert_eq!(result.output, "src/main.rs");
	}
}
