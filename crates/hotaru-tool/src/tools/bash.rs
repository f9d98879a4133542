//! Shell command execution, honouring cancellation and a default timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::{ToolContext, ToolResult};
use crate::error::{ExecResult, ToolError};
use crate::registry::Tool;

/// The bash tool's default timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct BashTool;

#[async_trait]
impl Tool for BashTool {
	fn id(&self) -> &'static str {
		"bash"
	}

	fn description(&self) -> &'static str {
		"Runs a shell command in the working directory."
	}

	fn parameters_schema(&self) -> Value {
		json!({
			"type": "object",
			"properties": {
				"command": {"type": "string"},
				"timeout_seconds": {"type": "number"},
			},
			"required": ["command"],
		})
	}

	fn required_permissions(&self, args: &Value) -> Vec<(String, String)> {
		let command = args.get("command").and_then(Value::as_str).unwrap_or_default();
		vec![("bash".to_string(), command.to_string())]
	}

	fn required_fields(&self) -> &'static [&'static str] {
		&["command"]
	}

	async fn execute(&self, args: Value, ctx: &ToolContext) -> ExecResult<ToolResult> {
		let command = args["command"].as_str().ok_or_else(|| ToolError::Validation("command must be a string".to_string()))?;
		let timeout = args
			.get("timeout_seconds")
			.and_then(Value::as_u64)
			.map(Duration::from_secs)
			.unwrap_or(DEFAULT_TIMEOUT);

		let mut child = tokio::process::Command::new("sh")
			.arg("-c")
			.arg(command)
			.current_dir(&ctx.directory)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.spawn()?;

		let aborted = ctx.aborted.clone();
		let wait = async {
			loop {
				if aborted.is_set() {
					let _ = child.kill().await;
					return Err(ToolError::Other("aborted".to_string()));
				}
				match child.try_wait() {
					Ok(Some(_)) => break,
					Ok(None) => tokio::time::sleep(Duration::from_millis(20)).await,
					Err(error) => return Err(ToolError::Io(error)),
				}
			}
			let output = child.wait_with_output().await?;
			Ok(output)
		};

		let output = match tokio::time::timeout(timeout, wait).await {
			Ok(result) => result?,
			Err(_) => return Err(ToolError::Other(format!("command timed out after {}s", timeout.as_secs()))),
		};

		let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
		if !output.stderr.is_empty() {
			combined.push_str(&String::from_utf8_lossy(&output.stderr));
		}
		let title = format!("$ {command}");
		Ok(ToolResult::text(title, combined))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hotaru_permission::PermissionService;
	use std::path::PathBuf;

	fn test_ctx(directory: PathBuf) -> ToolContext {
		ToolContext {
			session_id: "s1".into(),
			message_id: "m1".into(),
			agent: "main".into(),
			call_id: "c1".into(),
			directory,
			worktree: PathBuf::from("/"),
			metadata: Value::Null,
			aborted: crate::context::AbortFlag::new(),
			ruleset: Vec::new(),
			permission: PermissionService::start(hotaru_bus::Bus::new()),
			metadata_sink: crate::context::MetadataSink::new().0,
		}
	}

	#[tokio::test]
	async fn runs_a_command_and_captures_stdout() {
		let dir = tempfile::tempdir().unwrap();
		let ctx = test_ctx(dir.path().to_path_buf());
		let result = BashTool.execute(json!({"command": "echo hello"}), &ctx).await.unwrap();
		assert_eq!(result.output.trim(), "hello");
	}

	#[tokio::test]
	async fn abort_flag_kills_the_child() {
		let dir = tempfile::tempdir().unwrap();
		let ctx = test_ctx(dir.path().to_path_buf());
		ctx.aborted.set();
		let result = BashTool.execute(json!({"command": "sleep 5"}), &ctx).await;
		assert!(result.is_err());
	}
}
