//! The session loop: new-message handling, the turn loop that dispatches
//! tool calls through the tool framework, and undo/redo/compaction.
//!
//! Follows a fixed prompt-assembly order (system instructions, skill
//! catalogue, tool catalogue, history), and builds on `hotaru_storage`'s
//! `session/{id}`, `message/{session_id}/{id}`,
//! `part/{message_id}/{id}` key conventions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use hotaru_storage::{Key, TxOp};
use hotaru_tool::{AbortFlag, MetadataSink, ToolContext};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::warn;

use crate::container::RuntimeContainer;
use crate::error::{RuntimeError, RuntimeResult};
use crate::instruction;
use crate::model::{Message, MessagePartUpdated, Part, PartKind, Role, Session, SessionStatus, SessionStatusChanged, ToolCallState};
use crate::model_adapter::{AssistantPart, HistoryTurn, ModelAdapter, Prompt, ToolSpec};

/// A turn loop stops after this many steps even if the model keeps calling
/// tools.
const MAX_STEPS: usize = 50;

/// `@path` attachments resolved per new message are capped in count and
/// size.
const MAX_ATTACHMENTS: usize = 10;
const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

fn session_key(id: &str) -> Key {
	Key::new(["session", id])
}

fn message_key(session_id: &str, id: &str) -> Key {
	Key::new(["message", session_id, id])
}

fn part_key(message_id: &str, id: &str) -> Key {
	Key::new(["part", message_id, id])
}

/// Runs the session loop over a [`RuntimeContainer`] and a supplied
/// [`ModelAdapter`]. Holds the in-memory redo stack (keyed by session id),
/// which is transient and never persisted.
pub struct SessionLoop {
	container: Arc<RuntimeContainer>,
	model: Arc<dyn ModelAdapter>,
	redo_stacks: Mutex<HashMap<String, Vec<Vec<TxOp>>>>,
	/// The active turn's abort flag, keyed by session id. Populated for the
	/// duration of `run_turn` so `interrupt` can reach a turn in flight;
	/// absent between turns.
	abort_flags: Mutex<HashMap<String, AbortFlag>>,
}

impl SessionLoop {
	#[must_use]
	pub fn new(container: Arc<RuntimeContainer>, model: Arc<dyn ModelAdapter>) -> Self {
		Self {
			container,
			model,
			redo_stacks: Mutex::new(HashMap::new()),
			abort_flags: Mutex::new(HashMap::new()),
		}
	}

	/// Resolves or creates `session_id`, appends a user message parsed from
	/// `text` (plus any `@path` attachments it references), then runs the
	/// turn loop to completion. Refuses to start once the runtime has
	/// entered shutdown.
	pub async fn new_message(&self, session_id: &str, directory: PathBuf, worktree: PathBuf, agent: &str, text: &str) -> RuntimeResult<()> {
		if !self.container.accepting_turns() {
			return Err(RuntimeError::ShuttingDown);
		}

		let mut session = self.load_or_create_session(session_id, &directory, &worktree).await?;

		let message_id = uuid::Uuid::new_v4().to_string();
		let mut part_ids = Vec::new();

		let text_part_id = uuid::Uuid::new_v4().to_string();
		self.write_part(&message_id, &text_part_id, PartKind::Text { text: text.to_string() }).await?;
		part_ids.push(text_part_id);

		for attachment in resolve_attachments(&directory, text).await {
			let attachment_id = uuid::Uuid::new_v4().to_string();
			self.write_part(&message_id, &attachment_id, attachment).await?;
			part_ids.push(attachment_id);
		}

		let message = Message {
			id: message_id.clone(),
			session_id: session_id.to_string(),
			role: Role::User,
			part_ids,
		};
		self.container.storage.write(&message_key(session_id, &message_id), serde_json::to_value(&message)?).await?;

		session.message_ids.push(message_id);
		self.write_session(&session).await?;

		self.run_turn(session_id, directory, worktree, agent).await
	}

	async fn load_or_create_session(&self, session_id: &str, directory: &Path, worktree: &Path) -> RuntimeResult<Session> {
		match self.container.storage.read(&session_key(session_id)).await {
			Ok(value) => Ok(serde_json::from_value(value)?),
			Err(hotaru_storage::StorageError::NotFound(_)) => {
				let session = Session {
					id: session_id.to_string(),
					directory: directory.display().to_string(),
					worktree: worktree.display().to_string(),
					message_ids: Vec::new(),
					status: SessionStatus::Idle,
					compacted_before: None,
				};
				self.write_session(&session).await?;
				Ok(session)
			}
			Err(e) => Err(e.into()),
		}
	}

	async fn write_session(&self, session: &Session) -> RuntimeResult<()> {
		self.container.storage.write(&session_key(&session.id), serde_json::to_value(session)?).await?;
		Ok(())
	}

	async fn write_part(&self, message_id: &str, part_id: &str, kind: PartKind) -> RuntimeResult<()> {
		let part = Part {
			id: part_id.to_string(),
			message_id: message_id.to_string(),
			kind,
		};
		self.container.storage.write(&part_key(message_id, part_id), serde_json::to_value(&part)?).await?;
		Ok(())
	}

	async fn publish_part_updated(&self, session_id: &str, message_id: &str, part_id: &str) {
		let def = self.container.bus.define::<MessagePartUpdated>();
		let event = MessagePartUpdated {
			session_id: session_id.to_string(),
			message_id: message_id.to_string(),
			part_id: part_id.to_string(),
		};
		if let Err(error) = self.container.bus.publish(&def, event).await {
			warn!(%error, "failed to publish message.part.updated");
		}
	}

	async fn publish_status(&self, session_id: &str, status: SessionStatus) {
		let def = self.container.bus.define::<SessionStatusChanged>();
		let event = SessionStatusChanged {
			session_id: session_id.to_string(),
			status,
		};
		if let Err(error) = self.container.bus.publish(&def, event).await {
			warn!(%error, "failed to publish session.status");
		}
	}

	/// Builds a [`Prompt`], calls the model, dispatches any tool calls it
	/// makes through the tool framework's envelope, and loops until the
	/// model makes no further tool call, the step budget is exhausted, or
	/// [`SessionLoop::interrupt`] aborts the turn.
	async fn run_turn(&self, session_id: &str, directory: PathBuf, worktree: PathBuf, agent: &str) -> RuntimeResult<()> {
		let aborted = AbortFlag::new();
		self.abort_flags.lock().await.insert(session_id.to_string(), aborted.clone());

		for _ in 0..MAX_STEPS {
			if aborted.is_set() {
				break;
			}

			let session: Session = serde_json::from_value(self.container.storage.read(&session_key(session_id)).await?)?;

			let prompt = self.build_prompt(&session, &directory, &worktree, agent).await?;

			let assistant_message_id = uuid::Uuid::new_v4().to_string();
			let mut part_ids = Vec::new();
			let mut had_tool_call = false;

			let mut stream = self.model.stream_turn(prompt).await;
			while let Some(part) = stream.next().await {
				if aborted.is_set() {
					break;
				}
				match part {
					AssistantPart::Text(text) => {
						let part_id = uuid::Uuid::new_v4().to_string();
						self.write_part(&assistant_message_id, &part_id, PartKind::Text { text }).await?;
						self.publish_part_updated(session_id, &assistant_message_id, &part_id).await;
						part_ids.push(part_id);
					}
					AssistantPart::ToolCall { call_id, tool, arguments } => {
						had_tool_call = true;
						let part_id = self
							.dispatch_tool_call(session_id, &assistant_message_id, &directory, &worktree, agent, &call_id, &tool, arguments, aborted.clone())
							.await?;
						part_ids.push(part_id);
					}
				}
			}

			let assistant_message = Message {
				id: assistant_message_id.clone(),
				session_id: session_id.to_string(),
				role: Role::Assistant,
				part_ids,
			};
			self.container
				.storage
				.write(&message_key(session_id, &assistant_message_id), serde_json::to_value(&assistant_message)?)
				.await?;

			let mut session = session;
			session.message_ids.push(assistant_message_id);
			self.write_session(&session).await?;

			if !had_tool_call || aborted.is_set() {
				break;
			}
		}

		self.abort_flags.lock().await.remove(session_id);

		let mut session: Session = serde_json::from_value(self.container.storage.read(&session_key(session_id)).await?)?;
		session.status = SessionStatus::Idle;
		self.write_session(&session).await?;
		self.publish_status(session_id, SessionStatus::Idle).await;
		Ok(())
	}

	/// Aborts `session_id`'s active turn, if one is running, and transitions
	/// the session to `idle`. The in-flight tool call (if any) observes the
	/// shared [`AbortFlag`] at its next checkpoint; a turn with no tool call
	/// running stops at its next step boundary. A no-op beyond marking the
	/// session idle if no turn is currently active.
	pub async fn interrupt(&self, session_id: &str) -> RuntimeResult<()> {
		if let Some(flag) = self.abort_flags.lock().await.get(session_id) {
			flag.set();
		}

		let mut session: Session = serde_json::from_value(self.container.storage.read(&session_key(session_id)).await?)?;
		session.status = SessionStatus::Idle;
		self.write_session(&session).await?;
		self.publish_status(session_id, SessionStatus::Idle).await;
		Ok(())
	}

	async fn dispatch_tool_call(
		&self,
		session_id: &str,
		message_id: &str,
		directory: &Path,
		worktree: &Path,
		agent: &str,
		call_id: &str,
		tool: &str,
		arguments: Value,
		aborted: AbortFlag,
	) -> RuntimeResult<String> {
		let part_id = uuid::Uuid::new_v4().to_string();
		self.write_part(
			message_id,
			&part_id,
			PartKind::ToolCall {
				call_id: call_id.to_string(),
				tool: tool.to_string(),
				arguments: arguments.clone(),
				state: ToolCallState::Pending,
			},
		)
		.await?;
		self.publish_part_updated(session_id, message_id, &part_id).await;

		self.write_part(
			message_id,
			&part_id,
			PartKind::ToolCall {
				call_id: call_id.to_string(),
				tool: tool.to_string(),
				arguments: arguments.clone(),
				state: ToolCallState::Running,
			},
		)
		.await?;
		self.publish_part_updated(session_id, message_id, &part_id).await;

		let (metadata_sink, _metadata_rx) = MetadataSink::new();
		let ctx = ToolContext {
			session_id: session_id.to_string(),
			message_id: message_id.to_string(),
			agent: agent.to_string(),
			call_id: call_id.to_string(),
			directory: directory.to_path_buf(),
			worktree: worktree.to_path_buf(),
			metadata: Value::Null,
			aborted,
			ruleset: self.container.static_rules().to_vec(),
			permission: self.container.permission.clone(),
			metadata_sink,
		};

		let state = if self.container.tools.ids().iter().any(|id| *id == tool) {
			match self.container.tools.dispatch(tool, arguments.clone(), &ctx).await {
				Ok(result) => {
					for attachment in result.attachments {
						let attachment_id = uuid::Uuid::new_v4().to_string();
						self.write_part(
							message_id,
							&attachment_id,
							PartKind::FileAttachment {
								filename: attachment.filename,
								mime_type: attachment.mime_type,
								path: String::new(),
							},
						)
						.await?;
						self.publish_part_updated(session_id, message_id, &attachment_id).await;
					}
					ToolCallState::Completed { output: result.output }
				}
				Err(error) => ToolCallState::Error { message: error.to_string() },
			}
		} else {
			match self.container.mcp.call_tool(tool, arguments.clone()).await {
				Ok(output) => ToolCallState::Completed { output },
				Err(error) => ToolCallState::Error { message: error.to_string() },
			}
		};

		self.write_part(
			message_id,
			&part_id,
			PartKind::ToolCall {
				call_id: call_id.to_string(),
				tool: tool.to_string(),
				arguments,
				state,
			},
		)
		.await?;
		self.publish_part_updated(session_id, message_id, &part_id).await;

		Ok(part_id)
	}

	async fn build_prompt(&self, session: &Session, directory: &Path, worktree: &Path, agent: &str) -> RuntimeResult<Prompt> {
		let system_instructions = instruction::resolve(directory, worktree, &[]).await;
		let system_instructions = match self.container.agents.get(agent).and_then(|a| a.system_prompt_path.as_ref()) {
			Some(path) => match tokio::fs::read_to_string(path).await {
				Ok(agent_prompt) => format!("{agent_prompt}\n\n{system_instructions}"),
				Err(error) => {
					warn!(%error, path = %path.display(), "failed to read agent system prompt");
					system_instructions
				}
			},
			None => system_instructions,
		};

		let skill_summary = self.container.skills.catalogue_summary();

		let allowed_tools = self.container.agents.get(agent).and_then(|a| a.allowed_tools.clone());
		let mut tools: Vec<ToolSpec> = self
			.container
			.tools
			.ids()
			.into_iter()
			.filter(|id| allowed_tools.as_ref().is_none_or(|allowed| allowed.iter().any(|a| a.as_str() == *id)))
			.map(|id| ToolSpec {
				id: id.to_string(),
				description: String::new(),
				schema: self.container.tools.schema_for(id).unwrap_or(json!({})),
			})
			.collect();
		for name in self.container.mcp.qualified_tool_names().await {
			tools.push(ToolSpec {
				id: name,
				description: String::new(),
				schema: json!({}),
			});
		}

		let mut history = Vec::new();
		let start = session.compacted_before.as_ref().map_or(0, |boundary| session.message_ids.iter().position(|id| id == boundary).unwrap_or(0));
		for message_id in &session.message_ids[start..] {
			let Ok(value) = self.container.storage.read(&message_key(&session.id, message_id)).await else {
				continue;
			};
			let message: Message = serde_json::from_value(value)?;
			let mut text = String::new();
			for part_id in &message.part_ids {
				let Ok(value) = self.container.storage.read(&part_key(message_id, part_id)).await else {
					continue;
				};
				let part: Part = serde_json::from_value(value)?;
				match part.kind {
					PartKind::Text { text: t } => text.push_str(&t),
					PartKind::ToolCall { tool, state: ToolCallState::Completed { output }, .. } => {
						text.push_str(&format!("[{tool} -> {output}]"));
					}
					PartKind::ToolCall { tool, state: ToolCallState::Error { message }, .. } => {
						text.push_str(&format!("[{tool} failed: {message}]"));
					}
					PartKind::Compaction { summary } => text.push_str(&summary),
					_ => {}
				}
			}
			history.push(HistoryTurn {
				role: match message.role {
					Role::User => "user".to_string(),
					Role::Assistant => "assistant".to_string(),
				},
				text,
			});
		}

		Ok(Prompt {
			system_instructions,
			skill_summary,
			tools,
			history,
		})
	}

	/// Drops the last turn (the most recent user message and every message
	/// after it) as one atomic transaction, pushing the values it deleted
	/// onto an in-memory redo stack.
	pub async fn undo(&self, session_id: &str) -> RuntimeResult<()> {
		let session: Session = serde_json::from_value(self.container.storage.read(&session_key(session_id)).await?)?;

		let mut last_user_index = None;
		for (i, id) in session.message_ids.iter().enumerate().rev() {
			if self.message_is_user(session_id, id).await {
				last_user_index = Some(i);
				break;
			}
		}
		let Some(last_user_index) = last_user_index else {
			return Err(RuntimeError::NothingToUndo(session_id.to_string()));
		};

		let dropped_ids = session.message_ids[last_user_index..].to_vec();

		let mut redo_ops = vec![TxOp::Put {
			key: session_key(session_id),
			value: serde_json::to_value(&session)?,
		}];
		let mut delete_ops = Vec::new();

		for message_id in &dropped_ids {
			let message_value = self.container.storage.read(&message_key(session_id, message_id)).await?;
			let message: Message = serde_json::from_value(message_value.clone())?;
			redo_ops.push(TxOp::Put {
				key: message_key(session_id, message_id),
				value: message_value,
			});
			delete_ops.push(TxOp::Delete { key: message_key(session_id, message_id) });

			for part_id in &message.part_ids {
				let part_value = self.container.storage.read(&part_key(message_id, part_id)).await?;
				redo_ops.push(TxOp::Put {
					key: part_key(message_id, part_id),
					value: part_value,
				});
				delete_ops.push(TxOp::Delete { key: part_key(message_id, part_id) });
			}
		}

		let mut truncated_session = session;
		truncated_session.message_ids.truncate(last_user_index);
		delete_ops.push(TxOp::Put {
			key: session_key(session_id),
			value: serde_json::to_value(&truncated_session)?,
		});

		self.container.storage.transaction(delete_ops).await?;

		let mut stacks = self.redo_stacks.lock().await;
		stacks.entry(session_id.to_string()).or_default().push(redo_ops);
		Ok(())
	}

	/// Re-applies the most recently undone turn, if any.
	pub async fn redo(&self, session_id: &str) -> RuntimeResult<()> {
		let ops = {
			let mut stacks = self.redo_stacks.lock().await;
			let Some(stack) = stacks.get_mut(session_id) else {
				return Err(RuntimeError::NothingToRedo(session_id.to_string()));
			};
			stack.pop().ok_or_else(|| RuntimeError::NothingToRedo(session_id.to_string()))?
		};
		self.container.storage.transaction(ops).await?;
		Ok(())
	}

	async fn message_is_user(&self, session_id: &str, message_id: &str) -> bool {
		match self.container.storage.read(&message_key(session_id, message_id)).await {
			Ok(value) => serde_json::from_value::<Message>(value).map(|m| m.role == Role::User).unwrap_or(false),
			Err(_) => false,
		}
	}

	/// Summarizes every message before `boundary_id` into a single
	/// [`PartKind::Compaction`] part, inserts that part's message just
	/// before `boundary_id` in `session.message_ids` so `build_prompt` can
	/// still reach it once the detail before the boundary is pruned, and
	/// advances the session's `compacted_before` marker to the compaction
	/// message itself.
	pub async fn compact(&self, session_id: &str, boundary_id: &str, summary: String) -> RuntimeResult<()> {
		let mut session: Session = serde_json::from_value(self.container.storage.read(&session_key(session_id)).await?)?;

		let compaction_message_id = uuid::Uuid::new_v4().to_string();
		let compaction_part_id = uuid::Uuid::new_v4().to_string();
		self.write_part(&compaction_message_id, &compaction_part_id, PartKind::Compaction { summary }).await?;
		self.container
			.storage
			.write(
				&message_key(session_id, &compaction_message_id),
				serde_json::to_value(&Message {
					id: compaction_message_id.clone(),
					session_id: session_id.to_string(),
					role: Role::Assistant,
					part_ids: vec![compaction_part_id],
				})?,
			)
			.await?;

		let insert_at = session.message_ids.iter().position(|id| id == boundary_id).unwrap_or(session.message_ids.len());
		session.message_ids.insert(insert_at, compaction_message_id.clone());
		session.compacted_before = Some(compaction_message_id);
		self.write_session(&session).await?;
		Ok(())
	}
}

/// Resolves `@path` tokens in `text` into file-attachment parts, bounded by
/// `MAX_ATTACHMENTS` and `MAX_ATTACHMENT_BYTES`. Paths are resolved relative
/// to `directory`; tokens that don't name a readable, small-enough file are
/// skipped rather than failing the whole message.
async fn resolve_attachments(directory: &Path, text: &str) -> Vec<PartKind> {
	let mut attachments = Vec::new();
	for token in text.split_whitespace() {
		if attachments.len() >= MAX_ATTACHMENTS {
			break;
		}
		let Some(relative) = token.strip_prefix('@') else { continue };
		let path = directory.join(relative);

		let Ok(meta) = tokio::fs::metadata(&path).await else { continue };
		if !meta.is_file() || meta.len() > MAX_ATTACHMENT_BYTES {
			continue;
		}

		let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| relative.to_string());
		attachments.push(PartKind::FileAttachment {
			filename,
			mime_type: guess_mime_type(&path),
			path: path.display().to_string(),
		});
	}
	attachments
}

fn guess_mime_type(path: &Path) -> String {
	match path.extension().and_then(|e| e.to_str()) {
		Some("png") => "image/png",
		Some("jpg" | "jpeg") => "image/jpeg",
		Some("json") => "application/json",
		Some("md") => "text/markdown",
		_ => "text/plain",
	}
	.to_string()
}
