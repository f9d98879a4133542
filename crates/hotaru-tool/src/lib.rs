//! Tool contract, registry, and the six-step execution envelope.
//!
//! Argument validation, permission pre-check, external-directory check,
//! execute, auto-truncate at 2000 lines/50KB with 7-day retention, and LSP
//! feedback injection for file-touching tools.

mod context;
mod error;
mod registry;
mod tools;
mod truncate;

pub use context::{AbortFlag, Attachment, MetadataSink, ResultMetadata, ToolContext, ToolResult};
pub use error::{ExecResult, ToolError};
pub use registry::{Tool, ToolRegistry};
pub use tools::{BashTool, EditTool, GlobTool, GrepTool, InvalidTool, ListTool, ReadTool, TodoTool, WriteTool, registry_with_builtin_tools};
pub use truncate::{MAX_BYTES, MAX_LINES, RETENTION, TruncateDirection, sweep_expired_outputs};
