//! Reads a file's contents.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::{ToolContext, ToolResult};
use crate::error::{ExecResult, ToolError};
use crate::registry::Tool;

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
	fn id(&self) -> &'static str {
		"read"
	}

	fn description(&self) -> &'static str {
		"Reads a file's contents."
	}

	fn parameters_schema(&self) -> Value {
		json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]})
	}

	fn required_permissions(&self, args: &Value) -> Vec<(String, String)> {
		let path = args.get("path").and_then(Value::as_str).unwrap_or_default();
		vec![("read".to_string(), path.to_string())]
	}

	fn target_path(&self, args: &Value) -> Option<PathBuf> {
		args.get("path").and_then(Value::as_str).map(PathBuf::from)
	}

	fn required_fields(&self) -> &'static [&'static str] {
		&["path"]
	}

	async fn execute(&self, args: Value, ctx: &ToolContext) -> ExecResult<ToolResult> {
		let path = args["path"].as_str().ok_or_else(|| ToolError::Validation("path must be a string".to_string()))?;
		let resolved = ctx.directory.join(path);
		let content = tokio::fs::read_to_string(&resolved).await?;
		Ok(ToolResult::text(path, content))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hotaru_permission::PermissionService;

	#[tokio::test]
	async fn reads_an_existing_file() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::write(dir.path().join("a.txt"), "contents").await.unwrap();
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
		let result = ReadTool.execute(json!({"path": "a.txt"}), &ctx).await.unwrap();
		assert_eq!(result.output, "contents");
	}

	#[tokio::test]
	async fn missing_file_is_an_io_error() {
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
		let result = ReadTool.execute(json!({"path": "missing.txt"}), &ctx).await;
		assert!(matches!(result, Err(ToolError::Io(_))));
	}
}
