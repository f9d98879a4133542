//! The loopback HTTP server that receives the OAuth redirect.
//!
//! Bound once per host at a fixed port; startup is idempotent — a second
//! runtime on the same host finds the port taken, skips opening its own
//! listener, and simply won't receive callbacks in that process (the first
//! instance's listener is authoritative; `is_running` only reports that a
//! listener exists somewhere, not that this process owns it).

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;

use tiny_http::{Response, Server};
use tokio::sync::oneshot;

use crate::error::McpResult;

pub const PORT: u16 = 19876;
pub const CALLBACK_PATH: &str = "/mcp/oauth/callback";

pub fn redirect_uri() -> String {
	format!("http://127.0.0.1:{PORT}{CALLBACK_PATH}")
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<McpResult<String>>>>>;

/// Handle to the loopback callback server. Cheap to clone; all clones share
/// the same pending-auth table and, if this process bound the port, the same
/// background listener thread.
#[derive(Clone)]
pub struct CallbackServer {
	owns_listener: bool,
	pending: PendingMap,
}

impl CallbackServer {
	/// Binds the loopback server, or discovers that another instance already
	/// owns the port. Either outcome is a successful start.
	pub fn start() -> McpResult<Self> {
		let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

		match Server::http(format!("127.0.0.1:{PORT}")) {
			Ok(server) => {
				spawn_listener(server, pending.clone());
				Ok(Self { owns_listener: true, pending })
			}
			Err(e) => {
				let is_addr_in_use = e.downcast_ref::<io::Error>().map(|e| e.kind() == io::ErrorKind::AddrInUse).unwrap_or(false);
				if is_addr_in_use {
					tracing::info!(port = PORT, "loopback OAuth callback port already owned by another instance");
					Ok(Self { owns_listener: false, pending })
				} else {
					Err(crate::error::McpError::Io(io::Error::other(e)))
				}
			}
		}
	}

	/// Whether a callback listener exists on the fixed port (ours or another
	/// process's). Does not distinguish the two cases.
	pub fn is_running(&self) -> bool {
		self.owns_listener || std::net::TcpStream::connect(("127.0.0.1", PORT)).is_ok()
	}

	pub fn owns_listener(&self) -> bool {
		self.owns_listener
	}

	/// Registers `state` as awaiting a callback; returns a receiver that
	/// resolves once a matching `GET /mcp/oauth/callback?state=...` arrives.
	pub fn register_pending(&self, state: String) -> oneshot::Receiver<McpResult<String>> {
		let (tx, rx) = oneshot::channel();
		self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(state, tx);
		rx
	}
}

fn spawn_listener(server: Server, pending: PendingMap) {
	thread::spawn(move || {
		for request in server.incoming_requests() {
			let url = request.url().to_string();
			let parsed = match url::Url::parse(&format!("http://127.0.0.1{url}")) {
				Ok(u) => u,
				Err(_) => {
					let _ = request.respond(Response::from_string("bad request").with_status_code(400));
					continue;
				}
			};

			if parsed.path() != CALLBACK_PATH {
				let _ = request.respond(Response::from_string("not found").with_status_code(404));
				continue;
			}

			let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
			let Some(state) = params.get("state").cloned() else {
				let _ = request.respond(Response::from_string("missing state").with_status_code(400));
				continue;
			};

			let sender = pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&state);
			let Some(sender) = sender else {
				let _ = request.respond(Response::from_string("unknown or expired state").with_status_code(400));
				continue;
			};

			let result = match params.get("code").filter(|c| !c.is_empty()) {
				Some(code) => Ok(code.clone()),
				None => Err(crate::error::McpError::MissingCode(state.clone())),
			};

			let body = if result.is_ok() { "authenticated — you may close this tab." } else { "authentication failed — missing code" };
			let _ = request.respond(Response::from_string(body));
			let _ = sender.send(result);
		}
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn registering_then_unknown_state_is_dropped_silently() {
		let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
		let server = CallbackServer { owns_listener: false, pending };
		let _rx = server.register_pending("state-a".to_string());
		assert!(server.pending.lock().unwrap().contains_key("state-a"));
	}
}
