//! Tracks a per-session todo list the model can read and rewrite between
//! turns. State lives in the tool itself (keyed by session) since a tool is
//! shared across every call through an immutable `&self`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::context::{ToolContext, ToolResult};
use crate::error::{ExecResult, ToolError};
use crate::registry::Tool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
	pub content: String,
	pub status: TodoStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
	Pending,
	InProgress,
	Completed,
}

#[derive(Default)]
pub struct TodoTool {
	lists: Mutex<HashMap<String, Vec<TodoItem>>>,
}

#[async_trait]
impl Tool for TodoTool {
	fn id(&self) -> &'static str {
		"todo"
	}

	fn description(&self) -> &'static str {
		"Replaces the session's todo list and reports it back."
	}

	fn parameters_schema(&self) -> Value {
		json!({
			"type": "object",
			"properties": {
				"todos": {
					"type": "array",
					"items": {
						"type": "object",
						"properties": {"content": {"type": "string"}, "status": {"type": "string"}},
					},
				},
			},
			"required": ["todos"],
		})
	}

	fn required_permissions(&self, _args: &Value) -> Vec<(String, String)> {
		Vec::new()
	}

	fn auto_truncate(&self) -> bool {
		false
	}

	fn required_fields(&self) -> &'static [&'static str] {
		&["todos"]
	}

	async fn execute(&self, args: Value, ctx: &ToolContext) -> ExecResult<ToolResult> {
		let todos: Vec<TodoItem> = serde_json::from_value(args["todos"].clone()).map_err(|e| ToolError::Validation(e.to_string()))?;

		let summary = todos
			.iter()
			.map(|t| {
				let marker = match t.status {
					TodoStatus::Pending => "[ ]",
					TodoStatus::InProgress => "[~]",
					TodoStatus::Completed => "[x]",
				};
				format!("{marker} {}", t.content)
			})
			.collect::<Vec<_>>()
			.join("\n");

		ctx.metadata_sink.emit(json!({"todos": todos}));
		self.lists.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(ctx.session_id.clone(), todos);

		Ok(ToolResult::text("todo", summary))
	}
}
