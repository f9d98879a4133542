//! Per-call execution context and result value.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hotaru_permission::{AskError, PermissionHandle, PermissionRule, SessionId};
use serde_json::Value;
use tokio::sync::mpsc;

/// Shared, settable abort flag. Cloned into a [`ToolContext`] and held by
/// whatever spawns long-lived work (e.g. the session loop's `interrupt`
/// operation) so it can signal cancellation to the tool in flight.
#[derive(Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
	/// Creates a fresh, unset flag.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the flag; tools honouring it stop at their next checkpoint.
	pub fn set(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	/// Whether the flag has been set.
	#[must_use]
	pub fn is_set(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// Sink for incremental metadata updates a tool emits while running (e.g. a
/// bash tool streaming partial output before it exits).
#[derive(Clone)]
pub struct MetadataSink(mpsc::UnboundedSender<Value>);

impl MetadataSink {
	#[must_use]
	pub fn new() -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self(tx), rx)
	}

	/// Publishes a metadata update. Silently dropped if nothing is
	/// listening anymore (matches the bus's fire-and-forget semantics).
	pub fn emit(&self, update: Value) {
		let _ = self.0.send(update);
	}
}

/// Everything passed to a tool's `execute`.
pub struct ToolContext {
	pub session_id: SessionId,
	pub message_id: String,
	pub agent: String,
	pub call_id: String,
	pub directory: PathBuf,
	pub worktree: PathBuf,
	pub metadata: Value,
	pub aborted: AbortFlag,
	pub ruleset: Vec<PermissionRule>,
	pub permission: PermissionHandle,
	pub metadata_sink: MetadataSink,
}

impl ToolContext {
	/// Requests approval for `(permission, patterns)` under this call's
	/// session and ruleset. Thin wrapper so tool bodies don't need to
	/// thread `session_id`/`ruleset` through every call site.
	pub async fn request_permission(&self, permission: impl Into<String>, patterns: Vec<String>) -> Result<(), AskError> {
		self.permission
			.ask(self.session_id.clone(), permission, patterns, self.ruleset.clone())
			.await
	}

	/// True if `path` lies outside both `directory` and `worktree` (when
	/// `worktree` isn't the repo-less sentinel `/`). File-touching tools
	/// consult this before acting.
	#[must_use]
	pub fn is_external(&self, path: &Path) -> bool {
		let inside_directory = path.starts_with(&self.directory);
		let worktree_matters = self.worktree != Path::new("/");
		let inside_worktree = worktree_matters && path.starts_with(&self.worktree);
		!(inside_directory || inside_worktree)
	}
}

/// A file attachment a tool returns alongside its text output (e.g. an
/// image produced by a screenshot tool).
#[derive(Debug, Clone)]
pub struct Attachment {
	pub filename: String,
	pub mime_type: String,
	pub bytes: Vec<u8>,
}

/// Truncation bookkeeping the framework fills in, not the tool itself.
#[derive(Debug, Clone, Default)]
pub struct ResultMetadata {
	pub truncated: bool,
	pub output_path: Option<PathBuf>,
	pub extra: Value,
}

/// What a tool's `execute` returns, before the framework's auto-truncate and
/// LSP-feedback steps run.
#[derive(Debug, Clone)]
pub struct ToolResult {
	pub title: String,
	pub output: String,
	pub metadata: ResultMetadata,
	pub attachments: Vec<Attachment>,
}

impl ToolResult {
	/// Shorthand for a tool with no metadata or attachments to report.
	#[must_use]
	pub fn text(title: impl Into<String>, output: impl Into<String>) -> Self {
		Self {
			title: title.into(),
			output: output.into(),
			metadata: ResultMetadata::default(),
			attachments: Vec::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	// `PermissionHandle` has no public constructor outside `start`; the
	// tests below only exercise `is_external`, which never calls it, so a
	// handle that is never invoked is good enough here.
	fn test_permission_handle() -> PermissionHandle {
		hotaru_permission::PermissionService::start(hotaru_bus::Bus::new())
	}

	#[tokio::test]
	async fn is_external_true_outside_directory_and_worktree() {
		let ctx = ToolContext {
			session_id: "s1".into(),
			message_id: "m1".into(),
			agent: "main".into(),
			call_id: "c1".into(),
			directory: PathBuf::from("/home/user/project"),
			worktree: PathBuf::from("/home/user/project"),
			metadata: Value::Null,
			aborted: AbortFlag::new(),
			ruleset: Vec::new(),
			permission: test_permission_handle(),
			metadata_sink: MetadataSink::new().0,
		};
		assert!(ctx.is_external(Path::new("/etc/passwd")));
		assert!(!ctx.is_external(Path::new("/home/user/project/src/main.rs")));
	}

	#[tokio::test]
	async fn no_worktree_sentinel_only_checks_directory() {
		let ctx = ToolContext {
			session_id: "s1".into(),
			message_id: "m1".into(),
			agent: "main".into(),
			call_id: "c1".into(),
			directory: PathBuf::from("/tmp/scratch"),
			worktree: PathBuf::from("/"),
			metadata: Value::Null,
			aborted: AbortFlag::new(),
			ruleset: Vec::new(),
			permission: test_permission_handle(),
			metadata_sink: MetadataSink::new().0,
		};
		assert!(!ctx.is_external(Path::new("/tmp/scratch/a.txt")));
		assert!(ctx.is_external(Path::new("/tmp/other/a.txt")));
	}
}
