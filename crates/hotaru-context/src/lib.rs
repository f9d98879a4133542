//! Ambient async context and per-directory instance scope.
//!
//! Two cooperating mechanisms:
//!
//! - [`Context<T>`] binds a value to the current logical task for the
//!   duration of a future, readable anywhere in its call graph.
//! - [`InstanceRegistry`] resolves one [`Instance`] per directory, shared by
//!   every concurrent caller, and exposes it as the ambient
//!   `Context<Arc<Instance>>` while `provide`'s future runs.

mod context;
mod instance;
mod state;

pub use context::{Context, ContextNotFound};
pub use instance::{Instance, InstanceDisposed, InstanceRegistry};
pub use state::{InstanceState, StateAccessor};
