//! The shape of `hotaru.json`.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One `hotaru.json` document, after JSONC/env preprocessing and parsing.
/// Any field may be absent; absent fields simply contribute nothing when
/// merged into a lower-precedence layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
	/// Permission rules, appended (not replacing) the built-in defaults.
	/// Ordered; later entries win ties under last-match-wins evaluation.
	#[serde(default)]
	pub permission: Vec<RuleEntry>,

	/// Named agent definitions.
	#[serde(default)]
	pub agent: HashMap<String, AgentEntry>,

	/// Named MCP server definitions.
	#[serde(default)]
	pub mcp: HashMap<String, McpServerEntry>,

	/// Extra instruction file names to look for, in addition to
	/// `AGENTS.md`/`CLAUDE.md`, searched in the same root-to-leaf walk.
	#[serde(default)]
	pub instructions: Vec<String>,
}

/// A single permission rule as it appears in config (mirrors
/// `hotaru_permission::PermissionRule` field-for-field so this crate stays
/// free of a dependency cycle; `hotaru-runtime` converts between the two).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEntry {
	pub permission: String,
	pub pattern: String,
	pub action: RuleAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
	Allow,
	Deny,
	Ask,
}

/// A named subagent: a system prompt file and an optional tool allowlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
	pub system_prompt_path: Option<PathBuf>,
	#[serde(default)]
	pub allowed_tools: Option<Vec<String>>,
}

/// A configured MCP server: either a local process to spawn, or a remote
/// HTTP(S) endpoint with optional OAuth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpServerEntry {
	Local {
		command: String,
		#[serde(default)]
		args: Vec<String>,
		#[serde(default)]
		env: HashMap<String, String>,
	},
	Remote {
		url: String,
		#[serde(default)]
		oauth: Option<OAuthEndpoints>,
	},
}

/// OAuth endpoints for a remote MCP server. Read from config rather than
/// hardcoded to any single vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthEndpoints {
	pub authorization_endpoint: String,
	pub token_endpoint: String,
	#[serde(default)]
	pub registration_endpoint: Option<String>,
	#[serde(default)]
	pub client_id: Option<String>,
	#[serde(default)]
	pub client_secret: Option<String>,
	#[serde(default)]
	pub scopes: Vec<String>,
}

impl Config {
	/// Merges `other` on top of `self`; `other` is the higher-precedence
	/// layer. Rule lists are appended (order matters under last-match-wins).
	/// Maps are merged key-by-key with `other` winning collisions. Vectors
	/// of plain values are appended and deduplicated.
	pub fn merge(&mut self, other: Config) {
		self.permission.extend(other.permission);
		for (name, agent) in other.agent {
			self.agent.insert(name, agent);
		}
		for (name, server) in other.mcp {
			self.mcp.insert(name, server);
		}
		for instr in other.instructions {
			if !self.instructions.contains(&instr) {
				self.instructions.push(instr);
			}
		}
	}
}
