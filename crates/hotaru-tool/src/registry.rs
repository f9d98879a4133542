//! The `Tool` contract and the registry that applies the execution
//! envelope uniformly (validation, permission pre-check, external-directory
//! check, execute, auto-truncate, LSP feedback injection).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hotaru_lsp::LSPManager;
use serde_json::Value;

use crate::context::{ResultMetadata, ToolContext, ToolResult};
use crate::error::{ExecResult, ToolError};
use crate::truncate::{TruncateDirection, auto_truncate};

/// One local tool's contract. The registry owns the permission pre-check,
/// truncation, and LSP feedback; `execute` only does the tool's own work.
#[async_trait]
pub trait Tool: Send + Sync {
	/// Stable identifier exposed to the model (e.g. `"bash"`, `"read"`).
	fn id(&self) -> &'static str;

	/// One-line description surfaced in the tool catalogue.
	fn description(&self) -> &'static str;

	/// JSON Schema for `execute`'s `args`.
	fn parameters_schema(&self) -> Value;

	/// `(permission, pattern)` pairs this call needs approved, given its
	/// arguments. Consulted before any observable side effect.
	fn required_permissions(&self, args: &Value) -> Vec<(String, String)>;

	/// If this tool touches a file, the resolved path — used for the
	/// external-directory check. `None` for tools that never touch files.
	fn target_path(&self, args: &Value) -> Option<PathBuf> {
		let _ = args;
		None
	}

	/// Whether this tool participates in auto-truncation. `true` for
	/// every current tool; exists as a per-tool override point.
	fn auto_truncate(&self) -> bool {
		true
	}

	/// Which slice of an oversized output to keep. Defaults to the head;
	/// a tool whose useful signal sits at the end of a long output (e.g. the
	/// tail of a long-running command) overrides this to `Tail`.
	fn truncate_direction(&self) -> TruncateDirection {
		TruncateDirection::Head
	}

	/// Whether a successful call should trigger LSP feedback injection
	/// (true for tools that write files: `edit`, `write`).
	fn wants_lsp_feedback(&self) -> bool {
		false
	}

	/// Performs the tool's own work. Required field presence is validated
	/// by the registry via [`Tool::required_fields`] before this runs.
	async fn execute(&self, args: Value, ctx: &ToolContext) -> ExecResult<ToolResult>;

	/// Field names that must be present in `args` (a minimal schema check
	/// in lieu of a full JSON-Schema validator — only that malformed
	/// arguments are rejected before permission/execute is required, not a
	/// particular validator).
	fn required_fields(&self) -> &'static [&'static str] {
		&[]
	}
}

/// Owns the `id -> Tool` map and applies the six-step envelope uniformly.
pub struct ToolRegistry {
	tools: HashMap<&'static str, Arc<dyn Tool>>,
	data_dir: PathBuf,
	lsp: Option<Arc<LSPManager>>,
}

impl ToolRegistry {
	/// Creates an empty registry. `data_dir` is where truncated outputs are
	/// staged; `lsp` is consulted for post-edit diagnostics feedback if
	/// present.
	#[must_use]
	pub fn new(data_dir: PathBuf, lsp: Option<Arc<LSPManager>>) -> Self {
		Self {
			tools: HashMap::new(),
			data_dir,
			lsp,
		}
	}

	/// Registers a tool, replacing any previous tool with the same id.
	pub fn register(&mut self, tool: Arc<dyn Tool>) {
		self.tools.insert(tool.id(), tool);
	}

	/// The ids of every registered tool, for catalogue assembly.
	#[must_use]
	pub fn ids(&self) -> Vec<&'static str> {
		self.tools.keys().copied().collect()
	}

	/// Looks up a tool's schema for exposure to the model.
	#[must_use]
	pub fn schema_for(&self, id: &str) -> Option<Value> {
		self.tools.get(id).map(|t| t.parameters_schema())
	}

	/// Runs the full execution envelope for `tool_id` with `args` under
	/// `ctx`.
	pub async fn dispatch(&self, tool_id: &str, args: Value, ctx: &ToolContext) -> ExecResult<ToolResult> {
		let tool = self.tools.get(tool_id).ok_or_else(|| ToolError::UnknownTool(tool_id.to_string()))?.clone();

		// Step 1: argument validation.
		validate_required_fields(tool.required_fields(), &args)?;

		// Step 2: permission pre-check.
		for (permission, pattern) in tool.required_permissions(&args) {
			ctx.request_permission(permission, vec![pattern]).await?;
		}

		// Step 3: external-directory check.
		let target_path = tool.target_path(&args);
		if let Some(path) = &target_path
			&& ctx.is_external(path)
		{
			ctx.request_permission("external_directory", vec![path.display().to_string()]).await?;
		}

		// Step 4: execute.
		let result = tool.execute(args, ctx).await?;

		// Step 5: auto-truncate.
		let (output, metadata) = if tool.auto_truncate() {
			let (output, metadata) = auto_truncate(&self.data_dir, &ctx.call_id, result.output, tool.truncate_direction()).await?;
			(output, merge_metadata(result.metadata, metadata))
		} else {
			(result.output, result.metadata)
		};

		// Step 6: LSP feedback injection, reusing the `target_path` the
		// external-directory check already resolved (the file just
		// touched, for `edit`/`write`).
		let output = if tool.wants_lsp_feedback()
			&& let Some(path) = &target_path
		{
			self.append_lsp_feedback(output, path).await
		} else {
			output
		};

		Ok(ToolResult {
			title: result.title,
			output,
			metadata,
			attachments: result.attachments,
		})
	}

	async fn append_lsp_feedback(&self, output: String, path: &Path) -> String {
		let Some(lsp) = &self.lsp else { return output };
		let Ok(text) = tokio::fs::read_to_string(path).await else {
			return output;
		};
		if lsp.touch_file(path, &text, true).await.is_err() {
			return output;
		}
		let diagnostics = lsp.diagnostics(path).await;
		if diagnostics.is_empty() {
			return output;
		}

		const MAX_PER_FILE: usize = 20;
		let mut block = format!("\n\n<diagnostics file=\"{}\">\n", path.display());
		for diagnostic in diagnostics.iter().take(MAX_PER_FILE) {
			block.push_str(&format!(
				"{}:{}: {}\n",
				diagnostic.range.start.line + 1,
				diagnostic.range.start.character + 1,
				diagnostic.message
			));
		}
		if diagnostics.len() > MAX_PER_FILE {
			block.push_str(&format!("... and {} more\n", diagnostics.len() - MAX_PER_FILE));
		}
		block.push_str("</diagnostics>");
		format!("{output}{block}")
	}
}

fn validate_required_fields(fields: &[&'static str], args: &Value) -> ExecResult<()> {
	let Value::Object(map) = args else {
		if fields.is_empty() {
			return Ok(());
		}
		return Err(ToolError::Validation("arguments must be a JSON object".to_string()));
	};
	for field in fields {
		if !map.contains_key(*field) {
			return Err(ToolError::Validation(format!("missing required field {field:?}")));
		}
	}
	Ok(())
}

fn merge_metadata(tool_metadata: ResultMetadata, truncation: ResultMetadata) -> ResultMetadata {
	ResultMetadata {
		truncated: tool_metadata.truncated || truncation.truncated,
		output_path: truncation.output_path.or(tool_metadata.output_path),
		extra: tool_metadata.extra,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use hotaru_permission::PermissionService;
	use serde_json::json;

	struct Echo;

	#[async_trait]
	impl Tool for Echo {
		fn id(&self) -> &'static str {
			"echo"
		}
		fn description(&self) -> &'static str {
			"echoes its args back"
		}
		fn parameters_schema(&self) -> Value {
			json!({"type": "object", "properties": {"text": {"type": "string"}}})
		}
		fn required_permissions(&self, _args: &Value) -> Vec<(String, String)> {
			Vec::new()
		}
		fn required_fields(&self) -> &'static [&'static str] {
			&["text"]
		}
		async fn execute(&self, args: Value, _ctx: &ToolContext) -> ExecResult<ToolResult> {
			Ok(ToolResult::text("echo", args["text"].as_str().unwrap_or_default()))
		}
	}

	fn test_ctx() -> ToolContext {
		let permission = PermissionService::start(hotaru_bus::Bus::new());
		ToolContext {
			session_id: "s1".into(),
			message_id: "m1".into(),
			agent: "main".into(),
			call_id: "c1".into(),
			directory: PathBuf::from("/tmp"),
			worktree: PathBuf::from("/tmp"),
			metadata: Value::Null,
			aborted: crate::context::AbortFlag::new(),
			ruleset: Vec::new(),
			permission,
			metadata_sink: crate::context::MetadataSink::new().0,
		}
	}

	#[tokio::test]
	async fn missing_required_field_is_rejected_before_execute() {
		let dir = tempfile::tempdir().unwrap();
		let mut registry = ToolRegistry::new(dir.path().to_path_buf(), None);
		registry.register(Arc::new(Echo));
		let ctx = test_ctx();

		let result = registry.dispatch("echo", json!({}), &ctx).await;
		assert!(matches!(result, Err(ToolError::Validation(_))));
	}

	#[tokio::test]
	async fn valid_call_round_trips_through_the_envelope() {
		let dir = tempfile::tempdir().unwrap();
		let mut registry = ToolRegistry::new(dir.path().to_path_buf(), None);
		registry.register(Arc::new(Echo));
		let ctx = test_ctx();

		let result = registry.dispatch("echo", json!({"text": "hello"}), &ctx).await.unwrap();
		assert_eq!(result.output, "hello");
		assert!(!result.metadata.truncated);
	}

	#[tokio::test]
	async fn unknown_tool_id_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let registry = ToolRegistry::new(dir.path().to_path_buf(), None);
		let ctx = test_ctx();
		let result = registry.dispatch("nonexistent", json!({}), &ctx).await;
		assert!(matches!(result, Err(ToolError::UnknownTool(_))));
	}
}
