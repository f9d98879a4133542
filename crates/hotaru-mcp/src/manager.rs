//! Aggregates every configured MCP server: connects local (stdio) and remote
//! (HTTP, optionally OAuth) servers, tracks status, and exposes their tools
//! under the registry as `{client}_{tool}`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use hotaru_bus::Bus;
use hotaru_config::McpServerEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::callback_server::{self, CallbackServer};
use crate::client::MCPClient;
use crate::error::{McpError, McpResult};
use crate::oauth;
use crate::pkce::{PkceCodes, generate_state};
use crate::storage;
use crate::types::{AuthEntry, ServerStatus, ToolDescriptor};

const OAUTH_CALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Published whenever a server's tool list changes (connect, disconnect, or
/// a fresh `tools/list` after reconnect).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolsChanged {
	pub name: String,
	pub tools: Vec<String>,
}

/// Published when `webbrowser::open` fails to launch a browser for the
/// authorization URL; front-ends can fall back to printing the URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpBrowserOpenFailed {
	pub name: String,
	pub auth_url: String,
}

struct ManagedServer {
	entry: McpServerEntry,
	client: Option<MCPClient>,
	status: ServerStatus,
	tools: Vec<ToolDescriptor>,
}

pub struct MCPManager {
	bus: Bus,
	data_dir: PathBuf,
	servers: RwLock<HashMap<String, ManagedServer>>,
	callback: CallbackServer,
}

impl MCPManager {
	/// Starts the loopback callback server and connects every configured
	/// server. A local server that fails to spawn, or a remote server that
	/// cannot be reached, is recorded as `Failed` rather than aborting the
	/// whole manager.
	pub async fn start(config: HashMap<String, McpServerEntry>, bus: Bus, data_dir: PathBuf) -> McpResult<Self> {
		let callback = CallbackServer::start()?;
		let manager = Self { bus, data_dir, servers: RwLock::new(HashMap::new()), callback };

		for (name, entry) in config {
			manager.connect(&name, entry).await;
		}

		Ok(manager)
	}

	async fn connect(&self, name: &str, entry: McpServerEntry) {
		let (client, status) = match &entry {
			McpServerEntry::Local { command, args, env } => match MCPClient::spawn_local(name, command, args, env) {
				Ok(client) => (Some(client), ServerStatus::Connected),
				Err(error) => {
					tracing::warn!(%name, %error, "failed to spawn local MCP server");
					(None, ServerStatus::Failed)
				}
			},
			McpServerEntry::Remote { url, oauth: None } => (Some(MCPClient::connect_remote(name, url, None)), ServerStatus::Connected),
			McpServerEntry::Remote { url, oauth: Some(_) } => match storage::load_for_server(&self.data_dir, name, url) {
				Ok(Some(auth)) if auth.is_authenticated() => (Some(MCPClient::connect_remote(name, url, auth.access_token)), ServerStatus::Connected),
				Ok(_) => (None, ServerStatus::NeedsAuth),
				Err(error) => {
					tracing::warn!(%name, %error, "failed to read stored MCP auth");
					(None, ServerStatus::NeedsAuth)
				}
			},
		};

		let tools = if let Some(client) = &client { client.list_tools().await.unwrap_or_default() } else { Vec::new() };
		self.publish_tools_changed(name, &tools).await;

		let mut servers = self.servers.write().await;
		servers.insert(name.to_string(), ManagedServer { entry, client, status, tools });
	}

	async fn publish_tools_changed(&self, name: &str, tools: &[ToolDescriptor]) {
		let def = self.bus.define::<McpToolsChanged>();
		let event = McpToolsChanged { name: name.to_string(), tools: tools.iter().map(|t| t.name.clone()).collect() };
		if let Err(error) = self.bus.publish(&def, event).await {
			tracing::warn!(%error, "failed to publish mcp.tools.changed");
		}
	}

	pub async fn status(&self, name: &str) -> Option<ServerStatus> {
		self.servers.read().await.get(name).map(|s| s.status)
	}

	/// Every configured server's name and status, for the `mcp status` CLI
	/// verb.
	pub async fn statuses(&self) -> Vec<(String, ServerStatus)> {
		self.servers.read().await.iter().map(|(name, s)| (name.clone(), s.status)).collect()
	}

	pub fn is_callback_server_running(&self) -> bool {
		self.callback.is_running()
	}

	/// All tool names exposed under the registry, qualified as
	/// `{server}_{tool}`.
	pub async fn qualified_tool_names(&self) -> Vec<String> {
		let servers = self.servers.read().await;
		servers
			.iter()
			.filter(|(_, s)| s.status == ServerStatus::Connected)
			.flat_map(|(name, s)| s.tools.iter().map(move |t| format!("{name}_{}", t.name)))
			.collect()
	}

	/// Dispatches a qualified tool name (`{server}_{tool}`) to its owning
	/// client.
	pub async fn call_tool(&self, qualified_name: &str, arguments: Value) -> McpResult<String> {
		let servers = self.servers.read().await;
		for (name, server) in servers.iter() {
			let Some(tool_name) = qualified_name.strip_prefix(&format!("{name}_")) else {
				continue;
			};
			if !server.tools.iter().any(|t| t.name == tool_name) {
				continue;
			}
			let client = server.client.as_ref().ok_or_else(|| McpError::NotConnected(name.clone()))?;
			return client.call_tool(tool_name, arguments).await;
		}
		Err(McpError::UnknownServer(qualified_name.to_string()))
	}

	/// Runs the OAuth 2.1 + PKCE login flow for a remote server that needs
	/// authentication: builds the authorize URL, opens a browser, waits for
	/// the loopback callback, exchanges the code, and persists tokens.
	pub async fn authenticate(&self, name: &str) -> McpResult<()> {
		let (oauth_endpoints, server_url) = {
			let servers = self.servers.read().await;
			let server = servers.get(name).ok_or_else(|| McpError::UnknownServer(name.to_string()))?;
			match &server.entry {
				McpServerEntry::Remote { oauth: Some(endpoints), url } => (endpoints.clone(), url.clone()),
				_ => return Err(McpError::UnknownServer(format!("{name} has no OAuth configuration"))),
			}
		};

		let redirect_uri = callback_server::redirect_uri();
		let client_id = match &oauth_endpoints.client_id {
			Some(id) => id.clone(),
			None if oauth_endpoints.registration_endpoint.is_some() => {
				self.set_status(name, ServerStatus::NeedsClientRegistration).await;
				oauth::register_client(&oauth_endpoints, &redirect_uri).await?
			}
			None => return Err(McpError::ClientRegistration("no client_id and no registration_endpoint configured".to_string())),
		};

		let pkce = PkceCodes::generate();
		let state = generate_state();
		let auth_url = oauth::build_authorize_url(&oauth_endpoints, &redirect_uri, &pkce, &state)?;
		let rx = self.callback.register_pending(state);

		if webbrowser::open(&auth_url).is_err() {
			let def = self.bus.define::<McpBrowserOpenFailed>();
			let _ = self.bus.publish(&def, McpBrowserOpenFailed { name: name.to_string(), auth_url: auth_url.clone() }).await;
		}

		let code = tokio::time::timeout(OAUTH_CALLBACK_TIMEOUT, rx).await.map_err(|_| McpError::Timeout)?.map_err(|_| McpError::Cancelled)??;

		let tokens = oauth::exchange_code_for_tokens(&oauth_endpoints, &client_id, &redirect_uri, &pkce, &code).await?;
		let entry = AuthEntry { server_url: server_url.clone(), access_token: Some(tokens.access_token.clone()), refresh_token: tokens.refresh_token, client_id: Some(client_id), client_secret: oauth_endpoints.client_secret.clone() };
		storage::save_for_server(&self.data_dir, name, entry)?;

		let client = MCPClient::connect_remote(name, &server_url, Some(tokens.access_token));
		let tools = client.list_tools().await.unwrap_or_default();
		self.publish_tools_changed(name, &tools).await;

		let mut servers = self.servers.write().await;
		let server = servers.get_mut(name).ok_or_else(|| McpError::UnknownServer(name.to_string()))?;
		server.client = Some(client);
		server.tools = tools;
		server.status = ServerStatus::Connected;
		Ok(())
	}

	async fn set_status(&self, name: &str, status: ServerStatus) {
		if let Some(server) = self.servers.write().await.get_mut(name) {
			server.status = status;
		}
	}

	/// Re-runs connection for an already-configured server, e.g. after a
	/// manual `disconnect` or a local server that failed to spawn earlier.
	pub async fn reconnect(&self, name: &str) -> McpResult<()> {
		let entry = {
			let servers = self.servers.read().await;
			servers.get(name).ok_or_else(|| McpError::UnknownServer(name.to_string()))?.entry.clone()
		};
		self.connect(name, entry).await;
		Ok(())
	}

	pub async fn disconnect(&self, name: &str) -> McpResult<()> {
		let mut servers = self.servers.write().await;
		let server = servers.get_mut(name).ok_or_else(|| McpError::UnknownServer(name.to_string()))?;
		if let Some(client) = server.client.take() {
			client.shutdown().await;
		}
		server.tools.clear();
		server.status = ServerStatus::Disabled;
		Ok(())
	}

	pub async fn logout(&self, name: &str) -> McpResult<()> {
		self.disconnect(name).await?;
		storage::remove_for_server(&self.data_dir, name)?;
		self.set_status(name, ServerStatus::NeedsAuth).await;
		Ok(())
	}

	pub async fn shutdown(&self) {
		let mut servers = self.servers.write().await;
		for (name, server) in servers.drain() {
			if let Some(client) = server.client {
				client.shutdown().await;
			}
			tracing::debug!(%name, "MCP server shut down");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serial_test::serial;
	use std::collections::HashMap;

	#[tokio::test]
	#[serial(mcp_callback_port)]
	async fn local_server_connects_and_exposes_qualified_tool_names() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = HashMap::new();
		config.insert(
			"stub".to_string(),
			McpServerEntry::Local {
				command: "sh".to_string(),
				args: vec!["-c".to_string(), "read -r _; echo '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"tools\":[{\"name\":\"ping\"}]}}'".to_string()],
				env: HashMap::new(),
			},
		);

		let manager = MCPManager::start(config, Bus::new(), dir.path().to_path_buf()).await.unwrap();
		assert_eq!(manager.status("stub").await, Some(ServerStatus::Connected));
		assert_eq!(manager.qualified_tool_names().await, vec!["stub_ping".to_string()]);
		manager.shutdown().await;
	}

	#[tokio::test]
	#[serial(mcp_callback_port)]
	async fn remote_server_without_oauth_is_connected_immediately() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = HashMap::new();
		config.insert("remote".to_string(), McpServerEntry::Remote { url: "https://mcp.example/rpc".to_string(), oauth: None });

		let manager = MCPManager::start(config, Bus::new(), dir.path().to_path_buf()).await.unwrap();
		assert_eq!(manager.status("remote").await, Some(ServerStatus::Connected));
	}

	#[tokio::test]
	#[serial(mcp_callback_port)]
	async fn remote_server_with_oauth_and_no_stored_tokens_needs_auth() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = HashMap::new();
		config.insert(
			"secure".to_string(),
			McpServerEntry::Remote {
				url: "https://mcp.example/rpc".to_string(),
				oauth: Some(hotaru_config::OAuthEndpoints {
					authorization_endpoint: "https://auth.example/authorize".to_string(),
					token_endpoint: "https://auth.example/token".to_string(),
					registration_endpoint: None,
					client_id: Some("abc".to_string()),
					client_secret: None,
					scopes: Vec::new(),
				}),
			},
		);

		let manager = MCPManager::start(config, Bus::new(), dir.path().to_path_buf()).await.unwrap();
		assert_eq!(manager.status("secure").await, Some(ServerStatus::NeedsAuth));
	}

	#[tokio::test]
	#[serial(mcp_callback_port)]
	async fn reconnect_restores_a_disconnected_local_server() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = HashMap::new();
		config.insert(
			"stub".to_string(),
			McpServerEntry::Local {
				command: "sh".to_string(),
				args: vec!["-c".to_string(), "read -r _; echo '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"tools\":[{\"name\":\"ping\"}]}}'".to_string()],
				env: HashMap::new(),
			},
		);

		let manager = MCPManager::start(config, Bus::new(), dir.path().to_path_buf()).await.unwrap();
		manager.disconnect("stub").await.unwrap();
		assert_eq!(manager.status("stub").await, Some(ServerStatus::Disabled));

		manager.reconnect("stub").await.unwrap();
		assert_eq!(manager.status("stub").await, Some(ServerStatus::Connected));
		manager.shutdown().await;
	}

	#[test]
	#[serial(mcp_callback_port)]
	fn a_second_callback_server_on_the_same_host_does_not_open_its_own_listener() {
		let first = CallbackServer::start().unwrap();
		let second = CallbackServer::start().unwrap();
		assert!(first.owns_listener());
		assert!(!second.owns_listener());
		assert!(second.is_running());
	}
}
