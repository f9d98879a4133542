//! Runtime health aggregation: `{status, subsystems: {name -> {status,
//! critical, error?}}}`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single subsystem's or the runtime's overall health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
	Ready,
	Degraded,
	Failed,
}

/// One subsystem's reported state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemHealth {
	pub status: Status,
	pub critical: bool,
	pub error: Option<String>,
}

impl SubsystemHealth {
	#[must_use]
	pub fn ready(critical: bool) -> Self {
		Self {
			status: Status::Ready,
			critical,
			error: None,
		}
	}

	#[must_use]
	pub fn degraded(critical: bool, error: impl Into<String>) -> Self {
		Self {
			status: Status::Degraded,
			critical,
			error: Some(error.into()),
		}
	}

	#[must_use]
	pub fn failed(critical: bool, error: impl Into<String>) -> Self {
		Self {
			status: Status::Failed,
			critical,
			error: Some(error.into()),
		}
	}
}

/// The runtime's aggregate health: `Failed` if any critical subsystem is
/// `Failed`, `Degraded` if anything else is off `Ready`, else `Ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
	pub status: Status,
	pub subsystems: HashMap<String, SubsystemHealth>,
}

impl Health {
	#[must_use]
	pub fn from_subsystems(subsystems: HashMap<String, SubsystemHealth>) -> Self {
		let status = if subsystems.values().any(|s| s.critical && s.status == Status::Failed) {
			Status::Failed
		} else if subsystems.values().any(|s| s.status != Status::Ready) {
			Status::Degraded
		} else {
			Status::Ready
		};
		Self { status, subsystems }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn all_ready_subsystems_yield_ready_overall() {
		let mut subsystems = HashMap::new();
		subsystems.insert("mcp".to_string(), SubsystemHealth::ready(true));
		subsystems.insert("lsp".to_string(), SubsystemHealth::ready(false));
		assert_eq!(Health::from_subsystems(subsystems).status, Status::Ready);
	}

	#[test]
	fn non_critical_failure_degrades_but_does_not_fail() {
		let mut subsystems = HashMap::new();
		subsystems.insert("mcp".to_string(), SubsystemHealth::ready(true));
		subsystems.insert("lsp".to_string(), SubsystemHealth::failed(false, "rust-analyzer missing"));
		assert_eq!(Health::from_subsystems(subsystems).status, Status::Degraded);
	}

	#[test]
	fn critical_failure_fails_overall_regardless_of_others() {
		let mut subsystems = HashMap::new();
		subsystems.insert("mcp".to_string(), SubsystemHealth::failed(true, "connect timeout"));
		subsystems.insert("lsp".to_string(), SubsystemHealth::ready(false));
		assert_eq!(Health::from_subsystems(subsystems).status, Status::Failed);
	}
}
