//! Lists the immediate children of a directory.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::{ToolContext, ToolResult};
use crate::error::{ExecResult, ToolError};
use crate::registry::Tool;

pub struct ListTool;

#[async_trait]
impl Tool for ListTool {
	fn id(&self) -> &'static str {
		"list"
	}

	fn description(&self) -> &'static str {
		"Lists the immediate children of a directory."
	}

	fn parameters_schema(&self) -> Value {
		json!({"type": "object", "properties": {"path": {"type": "string"}}})
	}

	fn required_permissions(&self, _args: &Value) -> Vec<(String, String)> {
		Vec::new()
	}

	async fn execute(&self, args: Value, ctx: &ToolContext) -> ExecResult<ToolResult> {
		let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
		let resolved = ctx.directory.join(path);

		let mut names = Vec::new();
		let mut entries = tokio::fs::read_dir(&resolved).await?;
		while let Some(entry) = entries.next_entry().await? {
			let is_dir = entry.file_type().await?.is_dir();
			let name = entry.file_name().to_string_lossy().into_owned();
			names.push(if is_dir { format!("{name}/") } else { name });
		}
		names.sort();

		if names.is_empty() {
			return Err(ToolError::Validation(format!("not a directory: {path}")));
		}
		Ok(ToolResult::text(path, names.join("\n")))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hotaru_permission::PermissionService;
	use std::path::PathBuf;

	#[tokio::test]
	async fn lists_children_with_trailing_slash_on_dirs() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::create_dir_all(dir.path().join("sub")).await.unwrap();
		tokio::fs::write(dir.path().join("a.txt"), "").await.unwrap();

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
		let result = ListTool.execute(json!({}), &ctx).await.unwrap();
		assert_eq!(result.output, "a.txt\nsub/");
	}
}
