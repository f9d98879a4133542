//! Shared value types for the MCP manager.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
	Connected,
	Disabled,
	Failed,
	NeedsAuth,
	NeedsClientRegistration,
}

/// A tool exposed by an MCP server, as returned from `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(rename = "inputSchema", default)]
	pub input_schema: serde_json::Value,
}

/// Persisted OAuth state for one MCP server, bound to the `server_url` it
/// was issued against so a URL change invalidates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthEntry {
	pub server_url: String,
	pub access_token: Option<String>,
	pub refresh_token: Option<String>,
	pub client_id: Option<String>,
	pub client_secret: Option<String>,
}

impl AuthEntry {
	pub fn is_authenticated(&self) -> bool {
		self.access_token.is_some()
	}
}
