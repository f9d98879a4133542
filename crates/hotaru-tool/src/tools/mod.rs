//! Stub tool registrations with real (if minimal) bodies, so the registry's
//! envelope has genuine call sites to exercise. Concrete tool bodies are
//! kept minimal, just enough to demonstrate the framework contract.

mod bash;
mod edit;
mod glob;
mod grep;
mod invalid;
mod list;
mod read;
mod todo;
mod write;

pub use bash::BashTool;
pub use edit::EditTool;
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use invalid::InvalidTool;
pub use list::ListTool;
pub use read::ReadTool;
pub use todo::TodoTool;
pub use write::WriteTool;

use std::path::PathBuf;
use std::sync::Arc;

use hotaru_lsp::LSPManager;

use crate::registry::ToolRegistry;

/// Builds a registry with every stub tool registered.
#[must_use]
pub fn registry_with_builtin_tools(data_dir: PathBuf, lsp: Option<Arc<LSPManager>>) -> ToolRegistry {
	let mut registry = ToolRegistry::new(data_dir, lsp);
	registry.register(Arc::new(BashTool));
	registry.register(Arc::new(ReadTool));
	registry.register(Arc::new(WriteTool));
	registry.register(Arc::new(EditTool));
	registry.register(Arc::new(GlobTool));
	registry.register(Arc::new(GrepTool));
	registry.register(Arc::new(ListTool));
	registry.register(Arc::new(TodoTool));
	registry.register(Arc::new(InvalidTool));
	registry
}
