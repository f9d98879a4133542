//! Session/Message/Part records: persistent, keyed as
//! `session/{id}`, `message/{session_id}/{id}`, `part/{message_id}/{id}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A conversation. `message_ids` is the append-only order of messages;
/// `compacted_before` marks the id of the earliest message still included
/// verbatim in prompt assembly (everything before it is represented only by
/// the most recent `Compaction` part).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
	pub id: String,
	pub directory: String,
	pub worktree: String,
	pub message_ids: Vec<String>,
	pub status: SessionStatus,
	pub compacted_before: Option<String>,
}

/// The `session.status` event payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	Idle,
	Busy,
}

/// One turn's message: a role and an ordered list of part ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
	pub id: String,
	pub session_id: String,
	pub role: Role,
	pub part_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	User,
	Assistant,
}

/// One piece of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
	pub id: String,
	pub message_id: String,
	pub kind: PartKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartKind {
	Text {
		text: String,
	},
	Reasoning {
		text: String,
	},
	ToolCall {
		call_id: String,
		tool: String,
		arguments: Value,
		state: ToolCallState,
	},
	FileAttachment {
		filename: String,
		mime_type: String,
		path: String,
	},
	StepMarker,
	PatchSummary {
		summary: String,
	},
	Subtask {
		label: String,
	},
	Compaction {
		summary: String,
	},
}

/// A tool call part's lifecycle state: `pending -> running -> completed |
/// error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolCallState {
	Pending,
	Running,
	Completed { output: String },
	Error { message: String },
}

/// Published whenever a part is created or transitions state, so a UI can
/// refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePartUpdated {
	pub session_id: String,
	pub message_id: String,
	pub part_id: String,
}

/// Published when a session's overall status changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatusChanged {
	pub session_id: String,
	pub status: SessionStatus,
}
