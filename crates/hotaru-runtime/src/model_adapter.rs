//! The boundary between the session loop and a model backend.
//!
//! The loop depends only on [`ModelAdapter`], supplied by the caller. A
//! deterministic [`ScriptedAdapter`]
//! test double lives here so the loop's tool-dispatch, part-persistence, and
//! event-emission behavior is verifiable without a real model.

use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::Stream;
use futures::stream;
use serde_json::Value;

/// One entry in the conversation history handed to the model.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
	pub role: String,
	pub text: String,
}

/// One tool exposed to the model for this turn (registry ∪ MCP tools,
/// minus any disabled by rules).
#[derive(Debug, Clone)]
pub struct ToolSpec {
	pub id: String,
	pub description: String,
	pub schema: Value,
}

/// The assembled model prompt, in fixed order: system instructions, skill
/// catalogue summary, tool catalogue, history.
#[derive(Debug, Clone)]
pub struct Prompt {
	pub system_instructions: String,
	pub skill_summary: String,
	pub tools: Vec<ToolSpec>,
	pub history: Vec<HistoryTurn>,
}

/// One streamed piece of the assistant's response.
#[derive(Debug, Clone)]
pub enum AssistantPart {
	/// A chunk of assistant text.
	Text(String),
	/// A tool invocation the session loop must dispatch through the tool
	/// framework envelope before the turn can continue.
	ToolCall { call_id: String, tool: String, arguments: Value },
}

/// A boxed stream of assistant parts, the session loop's view of a model's
/// streamed response.
pub type AssistantStream = Pin<Box<dyn Stream<Item = AssistantPart> + Send>>;

/// Supplies model turns to the session loop. Implemented by the (external,
/// out-of-scope) model integration; the loop only ever calls
/// [`ModelAdapter::stream_turn`].
#[async_trait]
pub trait ModelAdapter: Send + Sync {
	async fn stream_turn(&self, prompt: Prompt) -> AssistantStream;
}

/// A deterministic test double: yields one pre-scripted response per call,
/// in the order [`ScriptedAdapter::new`] was given them. Calling past the
/// end of the script yields an empty stream (treated by the loop as "no
/// further tool calls").
pub struct ScriptedAdapter {
	turns: Mutex<std::collections::VecDeque<Vec<AssistantPart>>>,
}

impl ScriptedAdapter {
	#[must_use]
	pub fn new(turns: Vec<Vec<AssistantPart>>) -> Self {
		Self {
			turns: Mutex::new(turns.into_iter().collect()),
		}
	}
}

#[async_trait]
impl ModelAdapter for ScriptedAdapter {
	async fn stream_turn(&self, _prompt: Prompt) -> AssistantStream {
		let parts = self.turns.lock().expect("scripted adapter mutex poisoned").pop_front().unwrap_or_default();
		Box::pin(stream::iter(parts))
	}
}
