//! Permission request/reply actor.
//!
//! Owns session sticky rulesets (the "always" layer), in-flight
//! `PendingPermission`s, and the per-`(session, permission, pattern)` doom
//! loop counters. Modeled on the `Cmd`-enum actor idiom (one task owning
//! state, commands delivered over an `mpsc`, replies over a `oneshot`).

use std::collections::HashMap;

use hotaru_bus::Bus;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::evaluate::{DOOM_LOOP_THRESHOLD, evaluate_with_rule};
use crate::types::{Action, AskError, Decision, PermissionAsked, PermissionRule, SessionId};

#[derive(Debug)]
enum Cmd {
	Ask {
		session_id: SessionId,
		permission: String,
		patterns: Vec<String>,
		static_rules: Vec<PermissionRule>,
		reply: oneshot::Sender<Result<(), AskError>>,
	},
	Reply {
		request_id: Uuid,
		decision: Decision,
	},
	RecordFailure {
		session_id: SessionId,
		permission: String,
		pattern: String,
	},
	NewTurn {
		session_id: SessionId,
	},
}

/// Handle for issuing permission requests and replies.
#[derive(Clone)]
pub struct PermissionHandle {
	tx: mpsc::Sender<Cmd>,
}

impl PermissionHandle {
	/// Requests approval for one or more patterns under a single
	/// permission. Returns immediately with `Ok`/`Err(Denied)` when the
	/// merged ruleset fully resolves; otherwise waits for a human reply.
	pub async fn ask(
		&self,
		session_id: SessionId,
		permission: impl Into<String>,
		patterns: Vec<String>,
		static_rules: Vec<PermissionRule>,
	) -> Result<(), AskError> {
		let (reply, rx) = oneshot::channel();
		if self
			.tx
			.send(Cmd::Ask {
				session_id,
				permission: permission.into(),
				patterns,
				static_rules,
				reply,
			})
			.await
			.is_err()
		{
			return Err(AskError::ServiceGone);
		}
		rx.await.unwrap_or(Err(AskError::ServiceGone))
	}

	/// Answers a pending request.
	pub async fn reply(&self, request_id: Uuid, decision: Decision) {
		let _ = self.tx.send(Cmd::Reply { request_id, decision }).await;
	}

	/// Records a tool execution failure for doom loop tracking.
	pub async fn record_failure(&self, session_id: SessionId, permission: impl Into<String>, pattern: impl Into<String>) {
		let _ = self
			.tx
			.send(Cmd::RecordFailure {
				session_id,
				permission: permission.into(),
				pattern: pattern.into(),
			})
			.await;
	}

	/// Resets doom loop counters for a session at the start of a new turn.
	pub async fn new_turn(&self, session_id: SessionId) {
		let _ = self.tx.send(Cmd::NewTurn { session_id }).await;
	}
}

struct Pending {
	session_id: SessionId,
	permission: String,
	patterns: Vec<String>,
	static_rules: Vec<PermissionRule>,
	reply: oneshot::Sender<Result<(), AskError>>,
}

/// The permission actor's owned state.
pub struct PermissionService {
	rx: mpsc::Receiver<Cmd>,
	bus: Bus,
	sticky: HashMap<SessionId, Vec<PermissionRule>>,
	pending: HashMap<Uuid, Pending>,
	doom: HashMap<(SessionId, String, String), u32>,
}

impl PermissionService {
	/// Spawns the actor task and returns a handle to it. `bus` is used to
	/// publish `permission.asked` events.
	#[must_use]
	pub fn start(bus: Bus) -> PermissionHandle {
		let (tx, rx) = mpsc::channel(256);
		let service = Self {
			rx,
			bus,
			sticky: HashMap::new(),
			pending: HashMap::new(),
			doom: HashMap::new(),
		};
		tokio::spawn(service.run());
		PermissionHandle { tx }
	}

	async fn run(mut self) {
		while let Some(cmd) = self.rx.recv().await {
			match cmd {
				Cmd::Ask {
					session_id,
					permission,
					patterns,
					static_rules,
					reply,
				} => {
					self.handle_ask(session_id, permission, patterns, static_rules, reply).await;
				}
				Cmd::Reply { request_id, decision } => {
					self.handle_reply(request_id, decision);
				}
				Cmd::RecordFailure {
					session_id,
					permission,
					pattern,
				} => {
					*self.doom.entry((session_id, permission, pattern)).or_insert(0) += 1;
				}
				Cmd::NewTurn { session_id } => {
					self.doom.retain(|(sid, _, _), _| sid != &session_id);
				}
			}
		}
	}

	fn merged<'a>(&'a self, session_id: &SessionId, static_rules: &'a [PermissionRule]) -> Vec<&'a [PermissionRule]> {
		let mut layers = vec![static_rules];
		if let Some(session_rules) = self.sticky.get(session_id) {
			layers.push(session_rules.as_slice());
		}
		layers
	}

	fn resolve_one(&self, session_id: &SessionId, permission: &str, pattern: &str, static_rules: &[PermissionRule]) -> (Action, Option<PermissionRule>) {
		let doom_key = (session_id.clone(), permission.to_string(), pattern.to_string());
		if self.doom.get(&doom_key).copied().unwrap_or(0) >= DOOM_LOOP_THRESHOLD {
			return (Action::Ask, None);
		}
		let layers = self.merged(session_id, static_rules);
		match evaluate_with_rule(permission, pattern, &layers) {
			Some((action, rule)) => (action, Some(rule.clone())),
			None => (Action::Ask, None),
		}
	}

	async fn handle_ask(
		&mut self,
		session_id: SessionId,
		permission: String,
		patterns: Vec<String>,
		static_rules: Vec<PermissionRule>,
		reply: oneshot::Sender<Result<(), AskError>>,
	) {
		let mut denied = Vec::new();
		let mut undecided = false;
		for pattern in &patterns {
			let (action, rule) = self.resolve_one(&session_id, &permission, pattern, &static_rules);
			match action {
				Action::Deny => denied.extend(rule),
				Action::Ask => undecided = true,
				Action::Allow => {}
			}
		}

		if !denied.is_empty() {
			let _ = reply.send(Err(AskError::Denied(denied)));
			return;
		}
		if !undecided {
			let _ = reply.send(Ok(()));
			return;
		}

		let request_id = Uuid::new_v4();
		let event = PermissionAsked {
			request_id,
			session_id: session_id.clone(),
			items: patterns.iter().map(|p| (permission.clone(), p.clone())).collect(),
		};
		self.pending.insert(
			request_id,
			Pending {
				session_id,
				permission,
				patterns,
				static_rules,
				reply,
			},
		);
		let def = self.bus.define::<PermissionAsked>();
		if let Err(error) = self.bus.publish(&def, event).await {
			tracing::warn!(%error, "failed to publish permission.asked");
		}
	}

	fn handle_reply(&mut self, request_id: Uuid, decision: Decision) {
		let Some(pending) = self.pending.remove(&request_id) else {
			return;
		};

		match decision {
			Decision::Once => {
				let _ = pending.reply.send(Ok(()));
			}
			Decision::Always { always_patterns } => {
				let rules = self.sticky.entry(pending.session_id.clone()).or_default();
				for pattern in &always_patterns {
					rules.push(PermissionRule::new(pending.permission.clone(), pattern.clone(), Action::Allow));
				}
				let _ = pending.reply.send(Ok(()));
				self.resume_resolvable(&pending.session_id);
			}
			Decision::Reject { message } => {
				let outcome = match message {
					Some(text) => AskError::Corrected(text),
					None => AskError::Rejected,
				};
				let _ = pending.reply.send(Err(outcome));
				self.cascade_reject(&pending.session_id);
			}
		}
	}

	/// After a session's sticky ruleset grows, re-check every still-pending
	/// request for that session and auto-resume any that now fully allow.
	fn resume_resolvable(&mut self, session_id: &SessionId) {
		let ids: Vec<Uuid> = self
			.pending
			.iter()
			.filter(|(_, p)| &p.session_id == session_id)
			.map(|(id, _)| *id)
			.collect();

		for id in ids {
			let Some(pending) = self.pending.get(&id) else { continue };
			let all_allow = pending
				.patterns
				.iter()
				.all(|pattern| matches!(self.resolve_one(session_id, &pending.permission, pattern, &pending.static_rules).0, Action::Allow));
			if all_allow
				&& let Some(pending) = self.pending.remove(&id)
			{
				let _ = pending.reply.send(Ok(()));
			}
		}
	}

	fn cascade_reject(&mut self, session_id: &SessionId) {
		let ids: Vec<Uuid> = self
			.pending
			.iter()
			.filter(|(_, p)| &p.session_id == session_id)
			.map(|(id, _)| *id)
			.collect();
		for id in ids {
			if let Some(pending) = self.pending.remove(&id) {
				let _ = pending.reply.send(Err(AskError::Rejected));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::evaluate::builtin_defaults;
	use std::sync::Arc;
	use std::sync::atomic::{AtomicBool, Ordering};

	#[tokio::test]
	async fn fully_allowed_request_returns_without_prompting() {
		let handle = PermissionService::start(Bus::new());
		let rules = vec![PermissionRule::new("read", "*", Action::Allow)];
		let result = handle
			.ask("s1".to_string(), "read", vec!["src/main.rs".to_string()], rules)
			.await;
		assert!(result.is_ok());
	}

	#[tokio::test]
	async fn denied_pattern_fails_fast() {
		let handle = PermissionService::start(Bus::new());
		let result = handle
			.ask("s1".to_string(), "bash", vec!["rm -rf /*".to_string()], builtin_defaults())
			.await;
		assert!(matches!(result, Err(AskError::Denied(_))));
	}

	#[tokio::test]
	async fn pending_request_resolves_on_once_reply() {
		let bus = Bus::new();
		let def = bus.define::<PermissionAsked>();
		let handle = PermissionService::start(bus.clone());

		let handle_for_sub = handle.clone();
		let _unsub = bus.subscribe(&def, move |event: PermissionAsked| {
			let handle = handle_for_sub.clone();
			async move {
				handle.reply(event.request_id, Decision::Once).await;
			}
		});

		let rules = vec![PermissionRule::new("edit", "*", Action::Ask)];
		let result = handle.ask("s1".to_string(), "edit", vec!["a.rs".to_string()], rules).await;
		assert!(result.is_ok());
	}

	#[tokio::test]
	async fn always_reply_auto_resumes_sibling_pending_requests() {
		let bus = Bus::new();
		let def = bus.define::<PermissionAsked>();
		let handle = PermissionService::start(bus.clone());
		let rules = vec![PermissionRule::new("edit", "*", Action::Ask)];

		let handle_for_sub = handle.clone();
		let replied_once = Arc::new(AtomicBool::new(false));
		let replied_once2 = replied_once.clone();
		let _unsub = bus.subscribe(&def, move |event: PermissionAsked| {
			let handle = handle_for_sub.clone();
			let replied_once = replied_once2.clone();
			async move {
				if !replied_once.swap(true, Ordering::SeqCst) {
					handle
						.reply(
							event.request_id,
							Decision::Always {
								always_patterns: vec!["*".to_string()],
							},
						)
						.await;
				}
			}
		});

		let first = handle.ask("s1".to_string(), "edit", vec!["a.rs".to_string()], rules.clone());
		let second = handle.ask("s1".to_string(), "edit", vec!["b.rs".to_string()], rules.clone());
		let (r1, r2) = tokio::join!(first, second);
		assert!(r1.is_ok());
		assert!(r2.is_ok());
	}

	#[tokio::test]
	async fn reject_cascades_to_sibling_pending_requests() {
		let bus = Bus::new();
		let def = bus.define::<PermissionAsked>();
		let handle = PermissionService::start(bus.clone());
		let rules = vec![PermissionRule::new("edit", "*", Action::Ask)];

		let handle_for_sub = handle.clone();
		let replied_once = Arc::new(AtomicBool::new(false));
		let replied_once2 = replied_once.clone();
		let _unsub = bus.subscribe(&def, move |event: PermissionAsked| {
			let handle = handle_for_sub.clone();
			let replied_once = replied_once2.clone();
			async move {
				if !replied_once.swap(true, Ordering::SeqCst) {
					handle.reply(event.request_id, Decision::Reject { message: None }).await;
				}
			}
		});

		let first = handle.ask("s1".to_string(), "edit", vec!["a.rs".to_string()], rules.clone());
		let second = handle.ask("s1".to_string(), "edit", vec!["b.rs".to_string()], rules.clone());
		let (r1, r2) = tokio::join!(first, second);
		assert!(r1.is_err());
		assert!(r2.is_err());
	}

	#[tokio::test]
	async fn doom_loop_forces_fresh_ask_despite_always_rule() {
		let bus = Bus::new();
		let def = bus.define::<PermissionAsked>();
		let handle = PermissionService::start(bus.clone());
		let rules = vec![PermissionRule::new("bash", "git *", Action::Allow)];

		let asked = Arc::new(AtomicBool::new(false));
		let asked2 = asked.clone();
		let _unsub = bus.subscribe(&def, move |_: PermissionAsked| {
			let asked = asked2.clone();
			async move {
				asked.store(true, Ordering::SeqCst);
			}
		});

		for _ in 0..DOOM_LOOP_THRESHOLD {
			handle.record_failure("s1".to_string(), "bash", "git status").await;
		}

		// The always-allow rule would normally resolve this without
		// prompting; three tracked failures force a fresh `ask` instead.
		// Nothing ever replies, so race the request against a timeout.
		let ask = handle.ask("s1".to_string(), "bash", vec!["git status".to_string()], rules);
		let _ = tokio::time::timeout(std::time::Duration::from_millis(50), ask).await;
		assert!(asked.load(Ordering::SeqCst));
	}
}
