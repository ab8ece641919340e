//! Agent error types.
//!
//! All agent subsystems surface errors through [`AgentError`].

use std::path::PathBuf;

/// Unified error type for the agent runtime.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Configuration errors ------------------------------------------------
    /// A configuration file could not be read, parsed, validated or written.
    #[error("config error in {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    // -- Handler errors ------------------------------------------------------
    /// An event or message payload did not have the expected shape.
    #[error("invalid payload: {0}")]
    Payload(String),

    /// An operation targeted a memory tier that is disabled in configuration.
    #[error("{tier} memory is disabled")]
    TierDisabled { tier: &'static str },

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the kernel crate.
    #[error("kernel error: {0}")]
    Kernel(#[from] clawdlocal_kernel::KernelError),

    /// An error propagated from the store crate.
    #[error("store error: {0}")]
    Store(#[from] clawdlocal_store::StoreError),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    pub(crate) fn config(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Config {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
