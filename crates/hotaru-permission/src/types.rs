//! Shared types for permission and question gating.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies the session a permission/question request belongs to. Reused
/// verbatim from the session type in `hotaru-runtime`; kept as a plain
/// string here so this crate has no dependency on the session-loop crate.
pub type SessionId = String;

/// What a rule resolves a `(permission, pattern)` pair to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
	/// Proceed without prompting.
	Allow,
	/// Fail immediately with [`crate::AskError::Denied`].
	Deny,
	/// Prompt the user (the default when no rule matches).
	Ask,
}

/// One entry in a ruleset. `permission` and `pattern` are each matched as
/// glob patterns (so `*` matches any permission, or any pattern).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
	/// Glob over the permission name (e.g. `bash`, `edit`, `*`).
	pub permission: String,
	/// Glob over the pattern argument (e.g. a path glob, or `*`).
	pub pattern: String,
	/// The resolved action when both globs match.
	pub action: Action,
}

impl PermissionRule {
	/// Shorthand constructor.
	#[must_use]
	pub fn new(permission: impl Into<String>, pattern: impl Into<String>, action: Action) -> Self {
		Self {
			permission: permission.into(),
			pattern: pattern.into(),
			action,
		}
	}
}

/// How a pending permission request was answered.
#[derive(Debug, Clone)]
pub enum Decision {
	/// Resolve this one request, no lasting effect.
	Once,
	/// Resolve this request and remember an `allow` rule for each of
	/// `always_patterns` for the rest of the session.
	Always {
		/// Patterns to always-allow from now on, for the same permission.
		always_patterns: Vec<String>,
	},
	/// Refuse this request and cascade-reject every other pending request
	/// on the same session.
	Reject {
		/// Optional user-supplied correction, surfaced to the caller.
		message: Option<String>,
	},
}

/// Error returned when a requested action cannot proceed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AskError {
	/// A rule resolved one of the requested patterns to `deny`.
	#[error("denied by rule(s): {0:?}")]
	Denied(Vec<PermissionRule>),
	/// The user rejected the request outright.
	#[error("rejected by user")]
	Rejected,
	/// The user rejected the request but supplied a correction.
	#[error("rejected with feedback: {0}")]
	Corrected(String),
	/// The service was dropped before the request could be resolved.
	#[error("permission service shut down before replying")]
	ServiceGone,
}

/// Event published when a request starts waiting on a user decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionAsked {
	/// The request's id, to be echoed back in the reply.
	pub request_id: Uuid,
	/// The session this request belongs to.
	pub session_id: SessionId,
	/// The `(permission, pattern)` pairs still unresolved.
	pub items: Vec<(String, String)>,
}
