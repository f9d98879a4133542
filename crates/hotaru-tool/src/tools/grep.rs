//! Searches file contents under the working directory for a regex pattern.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};

use crate::context::{ToolContext, ToolResult};
use crate::error::{ExecResult, ToolError};
use crate::registry::Tool;

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
	fn id(&self) -> &'static str {
		"grep"
	}

	fn description(&self) -> &'static str {
		"Searches file contents under the working directory for a regex pattern."
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
		let regex = Regex::new(pattern).map_err(|e| ToolError::Validation(e.to_string()))?;

		let mut hits = Vec::new();
		let mut stack = vec![ctx.directory.clone()];
		while let Some(dir) = stack.pop() {
			let mut entries = tokio::fs::read_dir(&dir).await?;
			while let Some(entry) = entries.next_entry().await? {
				let path = entry.path();
				if entry.file_type().await?.is_dir() {
					stack.push(path);
					continue;
				}
				let Ok(content) = tokio::fs::read_to_string(&path).await else {
					continue;
				};
				for (line_number, line) in content.lines().enumerate() {
					if regex.is_match(line) {
						let relative = path.strip_prefix(&ctx.directory).unwrap_or(&path);
						hits.push(format!("{}:{}: {}", relative.display(), line_number + 1, line));
					}
				}
			}
		}
		Ok(ToolResult::text(pattern, hits.join("\n")))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hotaru_permission::PermissionService;
	use std::path::PathBuf;

	#[tokio::test]
	async fn finds_matching_lines_with_location() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::write(dir.path().join("a.txt"), "hello\nworld\nhello again").await.unwrap();

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
		let result = GrepTool.execute(json!({"pattern": "hello"}), &ctx).await.unwrap();
		assert_eq!(result.output, "a.txt:1: hello\na.txt:3: hello again");
	}
}
