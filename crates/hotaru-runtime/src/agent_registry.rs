//! Named subagent definitions, loaded from config. Lookup only — behavior
//! lives in the (out-of-scope) model-adapter and TUI layers.

use std::collections::HashMap;

use hotaru_config::AgentEntry;

/// The configured agents, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
	entries: HashMap<String, AgentEntry>,
}

impl AgentRegistry {
	#[must_use]
	pub fn from_config(entries: HashMap<String, AgentEntry>) -> Self {
		Self { entries }
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&AgentEntry> {
		self.entries.get(name)
	}

	#[must_use]
	pub fn names(&self) -> Vec<&str> {
		self.entries.keys().map(String::as_str).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn looks_up_configured_agents_by_name() {
		let mut entries = HashMap::new();
		entries.insert(
			"reviewer".to_string(),
			AgentEntry {
				system_prompt_path: None,
				allowed_tools: Some(vec!["read".to_string()]),
			},
		);
		let registry = AgentRegistry::from_config(entries);
		assert!(registry.get("reviewer").is_some());
		assert!(registry.get("nonexistent").is_none());
	}
}
