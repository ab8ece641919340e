//! ClawdLocal agent runtime.
//!
//! - **[`config`]** -- The YAML/TOML configuration model and loader.
//! - **[`memory`]** -- Tier-aware access to the memory manager.
//! - **[`handlers`]** -- Built-in event and message handlers.
//! - **[`agent`]** -- [`Agent`], which owns and wires every component.

pub mod agent;
pub mod config;
pub mod error;
pub mod handlers;
pub mod memory;

pub use agent::{Agent, AgentInfo};
pub use config::{Config, ConfigFormat, LogFormat, LogOutput};
pub use error::{AgentError, Result};
pub use memory::{MemoryAccess, MemoryTier};
