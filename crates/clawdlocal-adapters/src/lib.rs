//! ClawdLocal built-in tools.
//!
//! This crate provides the tools every agent starts with:
//!
//! - **[`filesystem`]** -- `file_read`, `file_write`, `file_list`, sandboxed
//!   to the agent's workspace directory.
//! - **[`network`]** -- `network_request`, an HTTP client tool.
//!
//! Tools are plain [`clawdlocal_kernel::Tool`] values; [`register_builtin_tools`]
//! installs all of them into a [`ToolRegistry`].

pub mod error;
pub mod filesystem;
pub mod network;

use std::path::PathBuf;

use clawdlocal_kernel::{Tool, ToolRegistry};

pub use error::{AdapterError, Result};
pub use filesystem::FilesystemTools;
pub use network::NetworkTool;

/// Every built-in tool, with filesystem access rooted at `workspace`.
pub fn builtin_tools(workspace: impl Into<PathBuf>) -> Vec<Tool> {
    let mut tools = FilesystemTools::new(workspace).into_tools();
    tools.push(NetworkTool::new().into_tool());
    tools
}

/// Register every built-in tool into `registry`.
///
/// Fails on the first name that is already registered.
pub fn register_builtin_tools(
    registry: &ToolRegistry,
    workspace: impl Into<PathBuf>,
) -> clawdlocal_kernel::Result<()> {
    for tool in builtin_tools(workspace) {
        registry.register_tool(tool)?;
    }
    tracing::info!(count = registry.len(), "built-in tools registered");
    Ok(())
}
