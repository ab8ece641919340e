//! Agent configuration.
//!
//! The configuration file is YAML by default (`config/default.yaml`) or TOML
//! when the path ends in `.toml`.  Every section and field has a default, so
//! a partial file, an empty file, or no file at all yields a usable config.
//!
//! Durations are written as human strings (`"250ms"`, `"30s"`, `"5m"`,
//! `"1h"`, `"1d"`) or as bare integer seconds.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clawdlocal_store::MemoryConfig as StoreConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AgentError, Result};

/// File name of the long-term tier inside `memory.long_term.storage_dir`.
pub const LONG_TERM_FILE: &str = "long_term.json";

/// Default configuration path used by the CLI.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.yaml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub memory: MemorySettings,
    pub web: WebConfig,
    pub plugins: PluginsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Root directory of the filesystem tools.  Created on load.
    pub workspace: PathBuf,
    /// Capacity of the event queue.
    pub max_queue_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "ClawdLocal".into(),
            version: "0.1.0".into(),
            description: "Lightweight local AI agent framework".into(),
            workspace: PathBuf::from("./workspace"),
            max_queue_size: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Period of the background sweep that drops expired short-term entries.
    #[serde(with = "human_duration")]
    pub cleanup_interval: Duration,
    pub short_term: ShortTermConfig,
    pub long_term: LongTermConfig,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(5 * 60),
            short_term: ShortTermConfig::default(),
            long_term: LongTermConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortTermConfig {
    pub enabled: bool,
    pub max_entries: usize,
    /// TTL applied when a store request does not carry one.  Zero disables
    /// expiry.
    #[serde(with = "human_duration")]
    pub default_ttl: Duration,
}

impl Default for ShortTermConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            default_ttl: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongTermConfig {
    pub enabled: bool,
    pub storage_dir: PathBuf,
}

impl Default for LongTermConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_dir: PathBuf::from("./memory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    /// Prefix of every JSON route, e.g. `/api/v1`.
    pub api_prefix: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".into(),
            port: 8080,
            static_dir: PathBuf::from("./web/static"),
            api_prefix: "/api/v1".into(),
        }
    }
}

/// Plugin settings.  Parsed and reported, never acted upon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub enabled: bool,
    pub paths: Vec<PathBuf>,
    pub auto_reload: bool,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            paths: vec![PathBuf::from("./plugins")],
            auto_reload: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
            output: LogOutput::Stdout,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
}

/// Serialization format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// TOML for a `.toml` extension, YAML for anything else.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading and saving
// ---------------------------------------------------------------------------

impl Config {
    /// Load the configuration at `path`.
    ///
    /// A missing file yields the defaults.  The agent workspace directory is
    /// created if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), "parsing configuration");
                Self::parse(&text, ConfigFormat::from_path(path))
                    .map_err(|reason| AgentError::config(path, reason))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(AgentError::config(path, e)),
        };

        config
            .validate()
            .map_err(|reason| AgentError::config(path, reason))?;

        std::fs::create_dir_all(&config.agent.workspace).map_err(|e| {
            AgentError::config(
                path,
                format!(
                    "cannot create workspace {}: {e}",
                    config.agent.workspace.display()
                ),
            )
        })?;

        Ok(config)
    }

    /// Parse configuration text.  Blank text yields the defaults.
    pub fn parse(text: &str, format: ConfigFormat) -> std::result::Result<Self, String> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        match format {
            ConfigFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(text).map_err(|e| e.to_string()),
        }
    }

    /// Render the configuration in the given format.
    pub fn render(&self, format: ConfigFormat) -> std::result::Result<String, String> {
        match format {
            ConfigFormat::Yaml => serde_yaml::to_string(self).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::to_string_pretty(self).map_err(|e| e.to_string()),
        }
    }

    /// Write the configuration to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = self
            .render(ConfigFormat::from_path(path))
            .map_err(|reason| AgentError::config(path, reason))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AgentError::config(path, e))?;
        }
        std::fs::write(path, text).map_err(|e| AgentError::config(path, e))?;
        info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.agent.max_queue_size == 0 {
            return Err("agent.max_queue_size must be greater than zero".into());
        }
        if self.memory.short_term.max_entries == 0 {
            return Err("memory.short_term.max_entries must be greater than zero".into());
        }
        if self.memory.cleanup_interval.is_zero() {
            return Err("memory.cleanup_interval must be greater than zero".into());
        }
        if !self.web.api_prefix.starts_with('/') {
            return Err(format!(
                "web.api_prefix must start with '/', got `{}`",
                self.web.api_prefix
            ));
        }
        Ok(())
    }

    /// Store construction parameters derived from the `memory` section.
    pub fn memory_config(&self) -> StoreConfig {
        let ttl = self.memory.short_term.default_ttl;
        StoreConfig::new(self.memory.long_term.storage_dir.join(LONG_TERM_FILE))
            .with_capacity(self.memory.short_term.max_entries)
            .with_default_ttl((!ttl.is_zero()).then_some(ttl))
            .with_cleanup_interval(self.memory.cleanup_interval)
    }
}

// ---------------------------------------------------------------------------
// Human-readable durations
// ---------------------------------------------------------------------------

/// Parse `"250ms"`, `"30s"`, `"5m"`, `"1h"`, `"1d"` or bare seconds.
pub fn parse_duration(text: &str) -> std::result::Result<Duration, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration `{text}`"))?;

    let multiplier_secs = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(n)),
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        other => return Err(format!("unknown duration unit `{other}` in `{text}`")),
    };
    n.checked_mul(multiplier_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration `{text}` is out of range"))
}

/// Render a duration in the largest unit that represents it exactly.
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms == 0 {
        return "0s".into();
    }
    if ms % 1000 != 0 {
        return format!("{ms}ms");
    }
    let secs = ms / 1000;
    match secs {
        s if s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s % 3_600 == 0 => format!("{}h", s / 3_600),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{s}s"),
    }
}

mod human_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(u64),
            Text(String),
        }

        match Raw::deserialize(d)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => super::parse_duration(&text).map_err(de::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
