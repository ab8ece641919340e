//! Adapter error types.
//!
//! Built-in tools surface errors through [`AdapterError`].  The tool
//! registry turns any of them into a [`ToolResult`](clawdlocal_kernel::ToolResult)
//! error string, so the variants exist for logs and for direct callers.

use std::path::PathBuf;

/// Unified error type for ClawdLocal built-in tools.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// An I/O operation failed within the tool.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The arguments supplied to a tool are invalid.
    #[error("invalid parameters for tool `{tool_name}`: {reason}")]
    InvalidParams { tool_name: String, reason: String },

    /// A path resolved outside the workspace root.
    #[error("access denied: `{}` is outside the workspace `{}`", .path.display(), .root.display())]
    AccessDenied { path: PathBuf, root: PathBuf },

    /// A tool invocation failed.
    #[error("execution failed for tool `{tool_name}`: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// An operation exceeded its time limit.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },
}

impl AdapterError {
    pub(crate) fn invalid(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            tool_name: tool_name.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
