//! CLI argument definitions for ClawdLocal.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clawdlocal_agent::config::DEFAULT_CONFIG_PATH;

/// ClawdLocal -- a lightweight local agent runtime.
#[derive(Debug, Parser)]
#[command(
    name = "clawdlocal",
    version,
    about = "ClawdLocal -- lightweight local AI agent framework",
    long_about = "Runs a local agent with an event loop, a priority message router, \
                  built-in tools and two-tier memory, exposed over an HTTP API."
)]
pub struct Cli {
    /// Path to the YAML (or .toml) configuration file.
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the agent and, when enabled, the web server.  Runs until Ctrl-C.
    Run,

    /// Print the effective configuration.
    Config {
        /// Write the configuration to this file instead of printing it.
        #[arg(long, short)]
        write: Option<PathBuf>,
    },

    /// List the built-in tools.
    Tools,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_defaults_to_the_standard_path() {
        let cli = Cli::try_parse_from(["clawdlocal", "run"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config/default.yaml"));
        assert!(matches!(cli.command, Commands::Run));
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli =
            Cli::try_parse_from(["clawdlocal", "config", "--config", "x.toml", "-w", "out.yaml"])
                .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        match cli.command {
            Commands::Config { write } => assert_eq!(write, Some(PathBuf::from("out.yaml"))),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
