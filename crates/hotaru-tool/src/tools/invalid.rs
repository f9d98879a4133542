//! A tool that never executes: it always fails argument validation, so
//! callers can exercise the "bad arguments routed back to the model"
//! path without depending on a real tool happening to be misused.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::{ToolContext, ToolResult};
use crate::error::{ExecResult, ToolError};
use crate::registry::Tool;

pub struct InvalidTool;

#[async_trait]
impl Tool for InvalidTool {
	fn id(&self) -> &'static str {
		"invalid"
	}

	fn description(&self) -> &'static str {
		"Always rejects its arguments; exists to exercise validation-error routing."
	}

	fn parameters_schema(&self) -> Value {
		json!({"type": "object", "properties": {}})
	}

	fn required_permissions(&self, _args: &Value) -> Vec<(String, String)> {
		Vec::new()
	}

	async fn execute(&self, _args: Value, _ctx: &ToolContext) -> ExecResult<ToolResult> {
		Err(ToolError::Validation("the invalid tool never accepts a call".to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hotaru_permission::PermissionService;
	use std::path::PathBuf;

	#[tokio::test]
	async fn always_returns_a_validation_error() {
		let ctx = ToolContext {
			session_id: "s1".into(),
			message_id: "m1".into(),
			agent: "main".into(),
			call_id: "c1".into(),
			directory: PathBuf::from("/tmp"),
			worktree: PathBuf::from("/"),
			metadata: Value::Null,
			aborted: crate::context::AbortFlag::new(),
			ruleset: Vec::new(),
			permission: PermissionService::start(hotaru_bus::Bus::new()),
			metadata_sink: crate::context::MetadataSink::new().0,
		};
		let result = InvalidTool.execute(json!({}), &ctx).await;
		assert!(matches!(result, Err(ToolError::Validation(_))));
	}
}
