//! Writes (creating or overwriting) a file's contents.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::{ToolContext, ToolResult};
use crate::error::{ExecResult, ToolError};
use crate::registry::Tool;

pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
	fn id(&self) -> &'static str {
		"write"
	}

	fn description(&self) -> &'static str {
		"Writes (creating or overwriting) a file's contents."
	}

	fn parameters_schema(&self) -> Value {
		json!({
			"type": "object",
			"properties": {"path": {"type": "string"}, "content": {"type": "string"}},
			"required": ["path", "content"],
		})
	}

	fn required_permissions(&self, args: &Value) -> Vec<(String, String)> {
		let path = args.get("path").and_then(Value::as_str).unwrap_or_default();
		vec![("write".to_string(), path.to_string())]
	}

	fn target_path(&self, args: &Value) -> Option<PathBuf> {
		args.get("path").and_then(Value::as_str).map(PathBuf::from)
	}

	fn wants_lsp_feedback(&self) -> bool {
		true
	}

	fn required_fields(&self) -> &'static [&'static str] {
		&["path", "content"]
	}

	async fn execute(&self, args: Value, ctx: &ToolContext) -> ExecResult<ToolResult> {
		let path = args["path"].as_str().ok_or_else(|| ToolError::Validation("path must be a string".to_string()))?;
		let content = args["content"].as_str().ok_or_else(|| ToolError::Validation("content must be a string".to_string()))?;
		let resolved = ctx.directory.join(path);
		if let Some(parent) = resolved.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		tokio::fs::write(&resolved, content).await?;
		Ok(ToolResult::text(path, "File written successfully."))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hotaru_permission::PermissionService;

	#[tokio::test]
	async fn writes_a_new_file_creating_parent_dirs() {
		let dir = tempfile::tempdir().unwrap();
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
		WriteTool.execute(json!({"path": "nested/a.txt", "content": "hi"}), &ctx).await.unwrap();
		let read_back = tokio::fs::read_to_string(dir.path().join("nested/a.txt")).await.unwrap();
		assert_eq!(read_back, "hi");
	}
}
