//! Replaces the first occurrence of `old_string` with `new_string` in a
//! file, then lets LSP feedback injection surface fresh diagnostics for it.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::{ToolContext, ToolResult};
use crate::error::{ExecResult, ToolError};
use crate::registry::Tool;

pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
	fn id(&self) -> &'static str {
		"edit"
	}

	fn description(&self) -> &'static str {
		"Replaces the first occurrence of old_string with new_string in a file."
	}

	fn parameters_schema(&self) -> Value {
		json!({
			"type": "object",
			"properties": {
				"path": {"type": "string"},
				"old_string": {"type": "string"},
				"new_string": {"type": "string"},
			},
			"required": ["path", "old_string", "new_string"],
		})
	}

	fn required_permissions(&self, args: &Value) -> Vec<(String, String)> {
		let path = args.get("path").and_then(Value::as_str).unwrap_or_default();
		vec![("edit".to_string(), path.to_string())]
	}

	fn target_path(&self, args: &Value) -> Option<PathBuf> {
		args.get("path").and_then(Value::as_str).map(PathBuf::from)
	}

	fn wants_lsp_feedback(&self) -> bool {
		true
	}

	fn required_fields(&self) -> &'static [&'static str] {
		&["path", "old_string", "new_string"]
	}

	async fn execute(&self, args: Value, ctx: &ToolContext) -> ExecResult<ToolResult> {
		let path = args["path"].as_str().ok_or_else(|| ToolError::Validation("path must be a string".to_string()))?;
		let old_string = args["old_string"].as_str().ok_or_else(|| ToolError::Validation("old_string must be a string".to_string()))?;
		let new_string = args["new_string"].as_str().ok_or_else(|| ToolError::Validation("new_string must be a string".to_string()))?;

		let resolved = ctx.directory.join(path);
		let content = tokio::fs::read_to_string(&resolved).await?;
		let Some(index) = content.find(old_string) else {
			return Err(ToolError::Other(format!("old_string not found in {path}")));
		};
		let mut updated = String::with_capacity(content.len());
		updated.push_str(&content[..index]);
		updated.push_str(new_string);
		updated.push_str(&content[index + old_string.len()..]);
		tokio::fs::write(&resolved, updated).await?;

		Ok(ToolResult::text(path, "Edit applied successfully."))
	}
}
