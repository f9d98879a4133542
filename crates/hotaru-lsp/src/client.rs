//! A live connection to one language server for one project root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use hotaru_bus::Bus;
use lsp_types::Diagnostic;
use serde_json::{Value, json};
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin};
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{LspError, LspResult};
use crate::rpc::{read_message, write_message};
use crate::server_def::ServerDefinition;

const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(45);
const DIAGNOSTICS_DEBOUNCE: Duration = Duration::from_millis(150);
const DIAGNOSTICS_WAIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Published once a client's `initialize` handshake completes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LspUpdated {
	/// The server definition id.
	pub server_id: String,
	/// The resolved project root.
	pub root: String,
}

struct Shared {
	writer: Mutex<ChildStdin>,
	next_id: AtomicI64,
	pending: Mutex<HashMap<i64, oneshot::Sender<Result<Value, Value>>>>,
	file_versions: Mutex<HashMap<PathBuf, i64>>,
	diagnostics: Mutex<HashMap<PathBuf, Vec<Diagnostic>>>,
	debounce: Mutex<HashMap<PathBuf, CancellationToken>>,
	waiters: Mutex<HashMap<PathBuf, Vec<oneshot::Sender<()>>>>,
}

/// A spawned server process plus its JSON-RPC correlation state.
pub struct LSPClient {
	shared: Arc<Shared>,
	child: Mutex<Child>,
	/// The server definition id this client was spawned from.
	pub server_id: &'static str,
	/// The resolved project root this client serves.
	pub root: PathBuf,
}

impl LSPClient {
	/// Spawns the server, performs the `initialize`/`initialized`
	/// handshake, and publishes `lsp.updated` on success.
	pub async fn spawn(def: &ServerDefinition, root: PathBuf, bus: Bus) -> LspResult<Self> {
		let mut command = (def.spawn)();
		command.current_dir(&root).stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::null());
		let mut child = command.spawn()?;
		let stdin = child.stdin.take().ok_or_else(|| LspError::Framing("child has no stdin".into()))?;
		let stdout = child.stdout.take().ok_or_else(|| LspError::Framing("child has no stdout".into()))?;

		let shared = Arc::new(Shared {
			writer: Mutex::new(stdin),
			next_id: AtomicI64::new(1),
			pending: Mutex::new(HashMap::new()),
			file_versions: Mutex::new(HashMap::new()),
			diagnostics: Mutex::new(HashMap::new()),
			debounce: Mutex::new(HashMap::new()),
			waiters: Mutex::new(HashMap::new()),
		});

		tokio::spawn(reader_loop(BufReader::new(stdout), shared.clone()));

		let client = Self {
			shared,
			child: Mutex::new(child),
			server_id: def.id,
			root: root.clone(),
		};

		let init_params = json!({
			"processId": std::process::id(),
			"rootUri": path_to_uri(&root),
			"capabilities": {},
		});
		let handshake = async {
			client.request("initialize", init_params).await?;
			client.notify("initialized", json!({})).await
		};
		tokio::time::timeout(INITIALIZE_TIMEOUT, handshake)
			.await
			.map_err(|_| LspError::InitializeTimeout)??;

		let def_event = bus.define::<LspUpdated>();
		if let Err(error) = bus
			.publish(
				&def_event,
				LspUpdated {
					server_id: def.id.to_string(),
					root: root.display().to_string(),
				},
			)
			.await
		{
			tracing::warn!(%error, "failed to publish lsp.updated");
		}

		Ok(client)
	}

	/// Sends a request and awaits its correlated response.
	pub async fn request(&self, method: &str, params: Value) -> LspResult<Value> {
		let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.shared.pending.lock().await.insert(id, tx);

		let payload = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
		{
			let mut writer = self.shared.writer.lock().await;
			write_message(&mut *writer, &payload).await?;
		}

		match rx.await {
			Ok(Ok(result)) => Ok(result),
			Ok(Err(error)) => Err(LspError::Framing(format!("server returned an error response: {error}"))),
			Err(_) => Err(LspError::Cancelled),
		}
	}

	/// Sends a one-way notification.
	pub async fn notify(&self, method: &str, params: Value) -> LspResult<()> {
		let payload = json!({"jsonrpc": "2.0", "method": method, "params": params});
		let mut writer = self.shared.writer.lock().await;
		write_message(&mut *writer, &payload).await
	}

	/// Opens the file (version 0) on first touch, or replaces its full text
	/// with an incremented version thereafter. Optionally waits up to 3s
	/// for a diagnostics-arrived signal for this path.
	pub async fn touch_file(&self, path: &Path, text: &str, wait_for_diagnostics: bool) -> LspResult<()> {
		let uri = path_to_uri(path);
		let (method, version) = {
			use std::collections::hash_map::Entry;
			let mut versions = self.shared.file_versions.lock().await;
			match versions.entry(path.to_path_buf()) {
				Entry::Vacant(slot) => {
					slot.insert(0);
					("textDocument/didOpen", 0)
				}
				Entry::Occupied(mut slot) => {
					let version = slot.get() + 1;
					*slot.get_mut() = version;
					("textDocument/didChange", version)
				}
			}
		};

		let params = if method == "textDocument/didOpen" {
			json!({"textDocument": {"uri": uri, "languageId": "", "version": version, "text": text}})
		} else {
			json!({"textDocument": {"uri": uri, "version": version}, "contentChanges": [{"text": text}]})
		};

		let waiter = if wait_for_diagnostics {
			let (tx, rx) = oneshot::channel();
			self.shared.waiters.lock().await.entry(path.to_path_buf()).or_default().push(tx);
			Some(rx)
		} else {
			None
		};

		self.notify(method, params).await?;

		if let Some(rx) = waiter {
			let _ = tokio::time::timeout(DIAGNOSTICS_WAIT_TIMEOUT, rx).await;
		}
		Ok(())
	}

	/// The most recently published diagnostics for `path`.
	pub async fn diagnostics(&self, path: &Path) -> Vec<Diagnostic> {
		self.shared.diagnostics.lock().await.get(path).cloned().unwrap_or_default()
	}

	/// Closes the writer, terminates the process, and cancels every
	/// pending awaiter with `LspError::Cancelled`.
	pub async fn shutdown(self) {
		let _ = self.request("shutdown", Value::Null).await;
		let _ = self.notify("exit", Value::Null).await;

		let mut pending = self.shared.pending.lock().await;
		for (_, tx) in pending.drain() {
			let _ = tx.send(Err(json!("client shutting down")));
		}
		drop(pending);

		let mut child = self.child.lock().await;
		let _ = child.kill().await;
	}
}

async fn reader_loop(mut reader: BufReader<tokio::process::ChildStdout>, shared: Arc<Shared>) {
	loop {
		let message = match read_message(&mut reader).await {
			Ok(Some(message)) => message,
			Ok(None) => break,
			Err(error) => {
				tracing::warn!(%error, "lsp reader stopped on framing error");
				break;
			}
		};

		if let Some(id) = message.get("id").and_then(Value::as_i64) {
			if message.get("method").is_none() {
				let mut pending = shared.pending.lock().await;
				if let Some(tx) = pending.remove(&id) {
					let result = match message.get("error") {
						Some(error) => Err(error.clone()),
						None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
					};
					let _ = tx.send(result);
				}
			} else {
				let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
				let response = json!({"jsonrpc": "2.0", "id": id, "result": minimal_affirmation(method)});
				let mut writer = shared.writer.lock().await;
				let _ = write_message(&mut *writer, &response).await;
			}
			continue;
		}

		if message.get("method").and_then(Value::as_str) == Some("textDocument/publishDiagnostics") {
			handle_diagnostics(message, shared.clone()).await;
		}
	}
}

async fn handle_diagnostics(message: Value, shared: Arc<Shared>) {
	let Some(params) = message.get("params") else { return };
	let Some(uri) = params.get("uri").and_then(Value::as_str) else { return };
	let Some(path) = uri_to_path(uri) else { return };
	let diagnostics: Vec<Diagnostic> = params
		.get("diagnostics")
		.and_then(|d| serde_json::from_value(d.clone()).ok())
		.unwrap_or_default();

	shared.diagnostics.lock().await.insert(path.clone(), diagnostics);

	let token = CancellationToken::new();
	let previous = shared.debounce.lock().await.insert(path.clone(), token.clone());
	if let Some(previous) = previous {
		previous.cancel();
	}

	tokio::spawn(async move {
		tokio::select! {
			() = tokio::time::sleep(DIAGNOSTICS_DEBOUNCE) => {
				if let Some(list) = shared.waiters.lock().await.remove(&path) {
					for tx in list {
						let _ = tx.send(());
					}
				}
			}
			() = token.cancelled() => {}
		}
	});
}

fn minimal_affirmation(method: &str) -> Value {
	match method {
		"workspace/configuration" => json!([{}]),
		"workspace/workspaceFolders" => json!([]),
		_ => Value::Null,
	}
}

fn path_to_uri(path: &Path) -> String {
	url::Url::from_file_path(path).map(|u| u.to_string()).unwrap_or_else(|()| format!("file://{}", path.display()))
}

fn uri_to_path(uri: &str) -> Option<PathBuf> {
	url::Url::parse(uri).ok()?.to_file_path().ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn minimal_affirmations_cover_documented_server_requests() {
		assert_eq!(minimal_affirmation("workspace/configuration"), json!([{}]));
		assert_eq!(minimal_affirmation("client/registerCapability"), Value::Null);
	}

	#[test]
	fn uri_round_trips_through_path() {
		let path = PathBuf::from("/tmp/example.rs");
		let uri = path_to_uri(&path);
		assert_eq!(uri_to_path(&uri).unwrap(), path);
	}
}
