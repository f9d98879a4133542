//! MCP (Model Context Protocol) client manager.
//!
//! Local (stdio) and remote (HTTP, optionally OAuth-protected) server
//! lifecycle, a fixed-port loopback OAuth callback, and tool exposure under
//! the registry as `{server}_{tool}`.

mod callback_server;
mod client;
mod error;
mod manager;
mod oauth;
mod pkce;
mod storage;
mod types;

pub use callback_server::{CALLBACK_PATH, CallbackServer, PORT, redirect_uri};
pub use client::MCPClient;
pub use error::{McpError, McpResult};
pub use manager::{MCPManager, McpBrowserOpenFailed, McpToolsChanged};
pub use pkce::{PkceCodes, generate_state};
pub use types::{AuthEntry, ServerStatus, ToolDescriptor};
