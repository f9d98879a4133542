//! The runtime container: aggregates every subsystem, wires the bus into
//! ambient context, and owns mixed-criticality startup/shutdown.
//!
//! One struct holding every subsystem's handle, a fallible `start` that
//! wires them together, and a best-effort `shutdown`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use hotaru_bus::Bus;
use hotaru_config::{Config, RuleAction};
use hotaru_context::InstanceRegistry;
use hotaru_lsp::LSPManager;
use hotaru_mcp::MCPManager;
use hotaru_permission::{Action, PermissionHandle, PermissionRule, PermissionService, QuestionHandle, QuestionService, builtin_defaults};
use hotaru_storage::Storage;
use hotaru_tool::{ToolRegistry, registry_with_builtin_tools};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::agent_registry::AgentRegistry;
use crate::error::{RuntimeError, RuntimeResult};
use crate::health::{Health, SubsystemHealth};
use crate::skill_registry::SkillRegistry;

/// Published by a `/init` command handler once project initialisation
/// completes; the container subscribes at startup to track which projects
/// have been initialised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandExecuted {
	pub command: String,
	pub project_id: String,
}

/// Everything the runtime aggregates into one running process.
pub struct RuntimeContainer {
	pub bus: Bus,
	pub permission: PermissionHandle,
	pub question: QuestionHandle,
	pub tools: Arc<ToolRegistry>,
	pub agents: AgentRegistry,
	pub skills: SkillRegistry,
	pub mcp: Arc<MCPManager>,
	pub lsp: Arc<LSPManager>,
	pub storage: Arc<Storage>,
	pub instances: Arc<InstanceRegistry>,
	data_dir: PathBuf,
	static_rules: Vec<PermissionRule>,
	health: RwLock<Health>,
	initialised_projects: RwLock<HashSet<String>>,
	accepting_turns: std::sync::atomic::AtomicBool,
	output_sweep: tokio::task::JoinHandle<()>,
}

/// How often the truncated tool-output retention sweep runs.
const OUTPUT_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60 * 60);

impl RuntimeContainer {
	/// Starts every subsystem. MCP is critical: if it fails, every
	/// subsystem that did start is rolled back (dropped, ending its actor
	/// task) and startup fails. LSP is non-critical: it has no fallible
	/// startup step of its own (servers spawn lazily per file), so its
	/// entry in [`Health`] starts `Ready` and only degrades once a spawn
	/// is later marked broken (see `hotaru_lsp::LSPManager`).
	pub async fn start(config: Config, data_dir: PathBuf, project_root: PathBuf) -> RuntimeResult<Arc<Self>> {
		let storage = Arc::new(Storage::open(&data_dir).await?);

		let bus = Bus::new();
		let permission = PermissionService::start(bus.clone());
		let question = QuestionService::start(bus.clone());
		let lsp = Arc::new(LSPManager::new(bus.clone()));

		let mcp = match MCPManager::start(config.mcp.clone(), bus.clone(), data_dir.clone()).await {
			Ok(mcp) => Arc::new(mcp),
			Err(source) => {
				warn!(%source, "critical subsystem mcp failed to start, rolling back");
				// `permission`, `question`, and `lsp` go out of scope here;
				// dropping the actor handles closes their mpsc channel,
				// ending the `PermissionService`/`QuestionService` tasks.
				// `lsp` has spawned nothing yet, so there is nothing to
				// terminate for it.
				return Err(RuntimeError::SubsystemFailed {
					subsystem: "mcp",
					source: Box::new(source),
				});
			}
		};

		let tools = Arc::new(registry_with_builtin_tools(data_dir.clone(), Some(lsp.clone())));
		let agents = AgentRegistry::from_config(config.agent.clone());
		let global_skill_dir = dirs::config_dir().map(|d| d.join("hotaru"));
		let skills = SkillRegistry::discover(Some(&project_root), global_skill_dir.as_deref()).await;

		let static_rules = merged_static_rules(&config);

		let mut subsystems = HashMap::new();
		subsystems.insert("mcp".to_string(), SubsystemHealth::ready(true));
		subsystems.insert("lsp".to_string(), SubsystemHealth::ready(false));
		subsystems.insert("permission".to_string(), SubsystemHealth::ready(false));
		subsystems.insert("question".to_string(), SubsystemHealth::ready(false));
		subsystems.insert("storage".to_string(), SubsystemHealth::ready(false));
		subsystems.insert("tool_registry".to_string(), SubsystemHealth::ready(false));
		let health = RwLock::new(Health::from_subsystems(subsystems));
		let output_sweep = spawn_output_sweep(data_dir.clone());

		let container = Arc::new(Self {
			bus: bus.clone(),
			permission,
			question,
			tools,
			agents,
			skills,
			mcp,
			lsp,
			storage,
			instances: Arc::new(InstanceRegistry::new()),
			data_dir,
			static_rules,
			health,
			initialised_projects: RwLock::new(HashSet::new()),
			accepting_turns: std::sync::atomic::AtomicBool::new(true),
			output_sweep,
		});

		container.subscribe_command_executed(&bus);
		Ok(container)
	}

	fn subscribe_command_executed(self: &Arc<Self>, bus: &Bus) {
		let def = bus.define::<CommandExecuted>();
		let container = self.clone();
		bus.subscribe(&def, move |event: CommandExecuted| {
			let container = container.clone();
			async move {
				if event.command == "/init" {
					container.initialised_projects.write().await.insert(event.project_id);
				}
			}
		});
	}

	/// Whether `project_id` has had `/init` run against it this process.
	pub async fn is_project_initialised(&self, project_id: &str) -> bool {
		self.initialised_projects.read().await.contains(project_id)
	}

	/// The runtime's current aggregate health.
	pub async fn health(&self) -> Health {
		self.health.read().await.clone()
	}

	/// Records a degradation for a non-critical subsystem (e.g. an LSP
	/// spawn failure discovered after startup).
	pub async fn report_degraded(&self, subsystem: &str, error: impl Into<String>) {
		let mut health = self.health.write().await;
		health.subsystems.insert(subsystem.to_string(), SubsystemHealth::degraded(false, error.into()));
		*health = Health::from_subsystems(health.subsystems.clone());
	}

	/// The merged static ruleset (built-in defaults + config rules) a tool
	/// call's permission check layers beneath a session's sticky "always"
	/// approvals (those live inside `hotaru_permission::PermissionService`
	/// itself, keyed by session).
	#[must_use]
	pub fn static_rules(&self) -> &[PermissionRule] {
		&self.static_rules
	}

	pub fn data_dir(&self) -> &std::path::Path {
		&self.data_dir
	}

	/// Whether the session loop should accept a new turn. Flipped off by
	/// [`RuntimeContainer::shutdown`]'s first step.
	#[must_use]
	pub fn accepting_turns(&self) -> bool {
		self.accepting_turns.load(std::sync::atomic::Ordering::SeqCst)
	}

	/// Best-effort ordered shutdown:
	/// 1. Stop accepting new turns.
	/// 2. Concurrently shut down MCP, LSP (permission/question have no
	///    explicit shutdown call; dropping their handles below ends their
	///    actor tasks).
	/// 3. Dispose every live instance.
	/// 4. Bus subscriptions and registries are released when this
	///    container (and its `Arc` clones) are dropped.
	pub async fn shutdown(&self) {
		self.accepting_turns.store(false, std::sync::atomic::Ordering::SeqCst);

		self.output_sweep.abort();

		let (_, _) = tokio::join!(self.mcp.shutdown(), self.lsp.shutdown());

		self.instances.dispose_all().await;
	}
}

/// Spawns the background loop that enforces `hotaru_tool`'s 7-day
/// truncated-output retention policy.
fn spawn_output_sweep(data_dir: PathBuf) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		let mut interval = tokio::time::interval(OUTPUT_SWEEP_INTERVAL);
		loop {
			interval.tick().await;
			match hotaru_tool::sweep_expired_outputs(&data_dir).await {
				Ok(removed) if removed > 0 => tracing::debug!(removed, "swept expired tool outputs"),
				Ok(_) => {}
				Err(error) => warn!(%error, "tool output retention sweep failed"),
			}
		}
	})
}

fn merged_static_rules(config: &Config) -> Vec<PermissionRule> {
	let mut rules = builtin_defaults();
	rules.extend(config.permission.iter().map(|entry| {
		PermissionRule::new(
			entry.permission.clone(),
			entry.pattern.clone(),
			match entry.action {
				RuleAction::Allow => Action::Allow,
				RuleAction::Deny => Action::Deny,
				RuleAction::Ask => Action::Ask,
			},
		)
	}));
	rules
}

#[cfg(test)]
mod tests {
	use super::*;
	use hotaru_config::RuleEntry;
	use tempfile::tempdir;

	#[tokio::test]
	async fn start_succeeds_with_empty_config_and_reports_ready_health() {
		let data_dir = tempdir().unwrap();
		let project_dir = tempdir().unwrap();
		let container = RuntimeContainer::start(Config::default(), data_dir.path().to_path_buf(), project_dir.path().to_path_buf()).await.unwrap();

		let health = container.health().await;
		assert_eq!(health.status, crate::health::Status::Ready);
		container.shutdown().await;
	}

	#[tokio::test]
	async fn config_rules_are_layered_above_builtin_defaults() {
		let mut config = Config::default();
		config.permission.push(RuleEntry {
			permission: "bash".to_string(),
			pattern: "git *".to_string(),
			action: RuleAction::Allow,
		});

		let data_dir = tempdir().unwrap();
		let project_dir = tempdir().unwrap();
		let container = RuntimeContainer::start(config, data_dir.path().to_path_buf(), project_dir.path().to_path_buf()).await.unwrap();

		let rules = container.static_rules();
		assert!(rules.iter().any(|r| r.permission == "bash" && r.pattern == "git *" && r.action == Action::Allow));
		container.shutdown().await;
	}

	#[tokio::test]
	async fn command_executed_for_init_marks_project_initialised() {
		let data_dir = tempdir().unwrap();
		let project_dir = tempdir().unwrap();
		let container = RuntimeContainer::start(Config::default(), data_dir.path().to_path_buf(), project_dir.path().to_path_buf()).await.unwrap();

		assert!(!container.is_project_initialised("proj1").await);

		let def = container.bus.define::<CommandExecuted>();
		container
			.bus
			.publish(
				&def,
				CommandExecuted {
					command: "/init".to_string(),
					project_id: "proj1".to_string(),
				},
			)
			.await
			.unwrap();

		assert!(container.is_project_initialised("proj1").await);
		container.shutdown().await;
	}
}
