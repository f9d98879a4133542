//! Free-form question gating.
//!
//! Mirrors the permission request/reply shape: one event family,
//! publish-then-await, answered by a single reply. Unlike permission
//! requests, there is no ruleset to pre-resolve against — every question
//! suspends the caller until answered.

use std::collections::HashMap;

use hotaru_bus::Bus;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::types::SessionId;

/// How a question was answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Answer {
	/// One of the offered `choices` was picked.
	Choice(String),
	/// Free-text input, for questions that allow it.
	Custom(String),
	/// The user declined to answer.
	Cancelled,
}

/// Error returned when a question cannot be answered.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QuestionError {
	/// The service was dropped before the question could be answered.
	#[error("question service shut down before replying")]
	ServiceGone,
}

/// Published when a question starts waiting on a reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAsked {
	/// Echoed back in the reply.
	pub request_id: Uuid,
	/// The session this question belongs to.
	pub session_id: SessionId,
	/// The prompt shown to the user.
	pub prompt: String,
	/// Offered choices; empty for a free-text-only question.
	pub choices: Vec<String>,
}

enum Cmd {
	Ask {
		session_id: SessionId,
		prompt: String,
		choices: Vec<String>,
		reply: oneshot::Sender<Result<Answer, QuestionError>>,
	},
	Reply {
		request_id: Uuid,
		answer: Answer,
	},
}

/// Handle for asking and answering questions.
#[derive(Clone)]
pub struct QuestionHandle {
	tx: mpsc::Sender<Cmd>,
}

impl QuestionHandle {
	/// Asks a question and suspends until answered.
	pub async fn ask(&self, session_id: SessionId, prompt: impl Into<String>, choices: Vec<String>) -> Result<Answer, QuestionError> {
		let (reply, rx) = oneshot::channel();
		if self
			.tx
			.send(Cmd::Ask {
				session_id,
				prompt: prompt.into(),
				choices,
				reply,
			})
			.await
			.is_err()
		{
			return Err(QuestionError::ServiceGone);
		}
		rx.await.unwrap_or(Err(QuestionError::ServiceGone))
	}

	/// Answers a pending question.
	pub async fn reply(&self, request_id: Uuid, answer: Answer) {
		let _ = self.tx.send(Cmd::Reply { request_id, answer }).await;
	}
}

/// The question actor's owned state.
pub struct QuestionService {
	rx: mpsc::Receiver<Cmd>,
	bus: Bus,
	pending: HashMap<Uuid, oneshot::Sender<Result<Answer, QuestionError>>>,
}

impl QuestionService {
	/// Spawns the actor task and returns a handle. `bus` is used to publish
	/// `question.asked` events.
	#[must_use]
	pub fn start(bus: Bus) -> QuestionHandle {
		let (tx, rx) = mpsc::channel(256);
		let service = Self {
			rx,
			bus,
			pending: HashMap::new(),
		};
		tokio::spawn(service.run());
		QuestionHandle { tx }
	}

	async fn run(mut self) {
		while let Some(cmd) = self.rx.recv().await {
			match cmd {
				Cmd::Ask {
					session_id,
					prompt,
					choices,
					reply,
				} => {
					let request_id = Uuid::new_v4();
					self.pending.insert(request_id, reply);
					let event = QuestionAsked {
						request_id,
						session_id,
						prompt,
						choices,
					};
					let def = self.bus.define::<QuestionAsked>();
					if let Err(error) = self.bus.publish(&def, event).await {
						tracing::warn!(%error, "failed to publish question.asked");
					}
				}
				Cmd::Reply { request_id, answer } => {
					if let Some(reply) = self.pending.remove(&request_id) {
						let _ = reply.send(Ok(answer));
					}
				}
			}
		}
	}
}
