//! Runtime container and session loop: the top-level assembly of every
//! other crate in this workspace into one running process.

mod agent_registry;
mod container;
mod error;
mod health;
mod instruction;
mod model;
mod model_adapter;
mod session;
mod skill_registry;

pub use agent_registry::AgentRegistry;
pub use container::{CommandExecuted, RuntimeContainer};
pub use error::{RuntimeError, RuntimeResult};
pub use health::{Health, Status, SubsystemHealth};
pub use model::{Message, MessagePartUpdated, Part, PartKind, Role, Session, SessionStatus, SessionStatusChanged, ToolCallState};
pub use model_adapter::{AssistantPart, AssistantStream, HistoryTurn, ModelAdapter, Prompt, ScriptedAdapter, ToolSpec};
pub use session::SessionLoop;
pub use skill_registry::{Skill, SkillRegistry};
