//! Tier-aware access to the memory manager.
//!
//! [`MemoryAccess`] applies the per-tier `enabled` switches of the `memory`
//! configuration section on top of a [`MemoryManager`].  The manager itself
//! carries the default short-term TTL.  Both the memory handlers and the
//! HTTP layer go through it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clawdlocal_store::{MemoryEntry, MemoryManager};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::MemorySettings;
use crate::error::{AgentError, Result};

/// One of the two memory tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    ShortTerm,
    LongTerm,
}

impl MemoryTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShortTerm => "short_term",
            Self::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryTier {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short_term" | "short" => Ok(Self::ShortTerm),
            "long_term" | "long" => Ok(Self::LongTerm),
            other => Err(AgentError::Payload(format!(
                "unknown memory tier `{other}` (expected short_term or long_term)"
            ))),
        }
    }
}

/// A [`MemoryManager`] plus the per-tier switches from configuration.
#[derive(Debug, Clone)]
pub struct MemoryAccess {
    manager: MemoryManager,
    short_term_enabled: bool,
    long_term_enabled: bool,
}

impl MemoryAccess {
    pub fn new(manager: MemoryManager, settings: &MemorySettings) -> Self {
        Self {
            manager,
            short_term_enabled: settings.short_term.enabled,
            long_term_enabled: settings.long_term.enabled,
        }
    }

    pub fn manager(&self) -> &MemoryManager {
        &self.manager
    }

    pub fn is_enabled(&self, tier: MemoryTier) -> bool {
        match tier {
            MemoryTier::ShortTerm => self.short_term_enabled,
            MemoryTier::LongTerm => self.long_term_enabled,
        }
    }

    fn ensure_enabled(&self, tier: MemoryTier) -> Result<()> {
        if self.is_enabled(tier) {
            Ok(())
        } else {
            Err(AgentError::TierDisabled {
                tier: tier.as_str(),
            })
        }
    }

    /// Store `value` under `key`.  `ttl` only applies to the short-term tier;
    /// `None` means the configured default.
    pub async fn store(
        &self,
        tier: MemoryTier,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.ensure_enabled(tier)?;
        match tier {
            MemoryTier::ShortTerm => {
                self.manager.set_short_term(key, value, ttl);
            }
            MemoryTier::LongTerm => self.manager.set_long_term(key, value).await?,
        }
        Ok(())
    }

    pub fn get(&self, tier: MemoryTier, key: &str) -> Result<Option<Value>> {
        self.ensure_enabled(tier)?;
        Ok(match tier {
            MemoryTier::ShortTerm => self.manager.get_short_term(key),
            MemoryTier::LongTerm => self.manager.get_long_term(key),
        })
    }

    /// Returns whether the key was present.
    pub async fn delete(&self, tier: MemoryTier, key: &str) -> Result<bool> {
        self.ensure_enabled(tier)?;
        match tier {
            MemoryTier::ShortTerm => Ok(self.manager.delete_short_term(key)),
            MemoryTier::LongTerm => Ok(self.manager.delete_long_term(key).await?),
        }
    }

    /// Every live entry of the tier, most recent first.
    pub fn list(&self, tier: MemoryTier) -> Result<Vec<MemoryEntry>> {
        self.ensure_enabled(tier)?;
        Ok(match tier {
            MemoryTier::ShortTerm => self.manager.all_short_term(),
            MemoryTier::LongTerm => self.manager.all_long_term(),
        })
    }
}
