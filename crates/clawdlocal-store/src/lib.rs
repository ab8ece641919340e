//! # clawdlocal-store
//!
//! Dual-tier memory for ClawdLocal.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  MemoryManager (one RwLock over both tiers) │
//! ├──────────────────────┬──────────────────────┤
//! │  Short-term          │  Long-term           │
//! │  HashMap, capacity + │  HashMap, unbounded, │
//! │  per-entry TTL,      │  full JSON snapshot  │
//! │  lazy + swept expiry │  on every write      │
//! │                      │  (blocking pool)     │
//! └──────────────────────┴──────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use std::time::Duration;
//! use clawdlocal_store::{MemoryConfig, MemoryManager};
//!
//! let memory = MemoryManager::new(MemoryConfig::new("memory/long_term.json"))?;
//! memory.set_short_term("session", serde_json::json!("abc"), Some(Duration::from_secs(60)));
//! memory.set_long_term("user_name", serde_json::json!("Ada")).await?;
//! ```

pub mod error;
pub mod memory;

// ── re-exports ───────────────────────────────────────────────────────

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryConfig, MemoryEntry, MemoryManager, MemoryStats};
