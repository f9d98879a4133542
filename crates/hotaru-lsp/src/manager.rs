//! Owns every live `(server_id, root)` client, spawning on first use and
//! marking failed spawns broken for the rest of the process's lifetime.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hotaru_bus::Bus;
use lsp_types::Diagnostic;
use tokio::sync::Mutex;

use crate::client::LSPClient;
use crate::error::{LspError, LspResult};
use crate::server_def::{ServerDefinition, builtin_servers};

type ClientKey = (&'static str, PathBuf);

/// Coordinates server definitions and their spawned clients.
pub struct LSPManager {
	definitions: Vec<ServerDefinition>,
	clients: Mutex<HashMap<ClientKey, Arc<LSPClient>>>,
	broken: Mutex<HashSet<ClientKey>>,
	bus: Bus,
}

impl LSPManager {
	/// Creates a manager with the built-in server definitions.
	#[must_use]
	pub fn new(bus: Bus) -> Self {
		Self {
			definitions: builtin_servers(),
			clients: Mutex::new(HashMap::new()),
			broken: Mutex::new(HashSet::new()),
			bus,
		}
	}

	/// Resolves (spawning if necessary) the client that handles `file`.
	pub async fn client_for(&self, file: &Path) -> LspResult<Arc<LSPClient>> {
		let def = self
			.definitions
			.iter()
			.find(|d| d.handles(file))
			.ok_or_else(|| LspError::NoServerForExtension(file.extension().and_then(|e| e.to_str()).map(String::from)))?;
		let root = def.find_root(file).await.unwrap_or_else(|| file.parent().unwrap_or(Path::new("/")).to_path_buf());
		let key: ClientKey = (def.id, root.clone());

		if self.broken.lock().await.contains(&key) {
			return Err(LspError::Broken {
				server_id: def.id.to_string(),
				root: root.display().to_string(),
			});
		}
		if let Some(existing) = self.clients.lock().await.get(&key) {
			return Ok(existing.clone());
		}

		match LSPClient::spawn(def, root.clone(), self.bus.clone()).await {
			Ok(client) => {
				let client = Arc::new(client);
				self.clients.lock().await.insert(key, client.clone());
				Ok(client)
			}
			Err(error) => {
				self.broken.lock().await.insert(key);
				Err(error)
			}
		}
	}

	/// Touches `file` on its handling server (opening or re-sending its
	/// full text), optionally waiting for diagnostics.
	pub async fn touch_file(&self, file: &Path, text: &str, wait_for_diagnostics: bool) -> LspResult<()> {
		let client = self.client_for(file).await?;
		client.touch_file(file, text, wait_for_diagnostics).await
	}

	/// The last known diagnostics for `file`, or empty if no server
	/// handles it or none have been published yet.
	pub async fn diagnostics(&self, file: &Path) -> Vec<Diagnostic> {
		match self.client_for(file).await {
			Ok(client) => client.diagnostics(file).await,
			Err(_) => Vec::new(),
		}
	}

	/// Shuts down every live client.
	pub async fn shutdown(&self) {
		let clients = std::mem::take(&mut *self.clients.lock().await);
		for (_, client) in clients {
			if let Ok(client) = Arc::try_unwrap(client) {
				client.shutdown().await;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn unknown_extension_is_rejected_before_any_spawn() {
		let manager = LSPManager::new(Bus::new());
		let result = manager.client_for(Path::new("/tmp/file.unknownext")).await;
		assert!(matches!(result, Err(LspError::NoServerForExtension(_))));
	}

	#[tokio::test]
	async fn spawn_failure_marks_the_key_broken() {
		let manager = LSPManager {
			definitions: vec![ServerDefinition {
				id: "nonexistent",
				extensions: &["zz"],
				root_anchors: &[],
				exclusion_anchor: None,
				spawn: || tokio::process::Command::new("definitely-not-a-real-binary-xyz"),
			}],
			clients: Mutex::new(HashMap::new()),
			broken: Mutex::new(HashSet::new()),
			bus: Bus::new(),
		};

		let file = PathBuf::from("/tmp/example.zz");
		let first = manager.client_for(&file).await;
		assert!(first.is_err());
		assert!(manager.broken.lock().await.contains(&("nonexistent", PathBuf::from("/tmp"))));

		// A second attempt short-circuits on the broken mark rather than
		// trying (and failing) to spawn again.
		let second = manager.client_for(&file).await;
		assert!(matches!(second, Err(LspError::Broken { .. })));
	}
}
