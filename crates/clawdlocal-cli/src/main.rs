//! CLI entry point for ClawdLocal.
//!
//! This binary provides the `clawdlocal` command: `run` starts the agent and
//! its web server, `config` prints or writes the effective configuration,
//! and `tools` lists the built-in tools.

mod cli;
mod helpers;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use clawdlocal_agent::config::ConfigFormat;
use clawdlocal_agent::{Agent, Config};
use clawdlocal_web::WebServer;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::{Cli, Commands};
use crate::helpers::init_tracing;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => cmd_run(&cli.config).await,
        Commands::Config { write } => cmd_config(&cli.config, write.as_deref()),
        Commands::Tools => cmd_tools(&cli.config),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

type ServerHandle = JoinHandle<std::io::Result<()>>;

async fn cmd_run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    init_tracing(&config.logging);
    info!(config = %config_path.display(), "starting ClawdLocal");

    if config.plugins.enabled && !config.plugins.paths.is_empty() {
        info!(paths = ?config.plugins.paths, "plugin loading is not supported; plugin paths ignored");
    }

    let agent = Agent::new(config.clone()).context("failed to initialise agent")?;
    agent.start().await.context("failed to start agent")?;

    let shutdown = CancellationToken::new();
    let mut server: Option<ServerHandle> = if config.web.enabled {
        let web = WebServer::new(agent.clone());
        info!(addr = %web.addr(), prefix = %config.web.api_prefix, "web interface enabled");
        Some(tokio::spawn(web.serve(shutdown.clone().cancelled_owned())))
    } else {
        None
    };

    println!();
    println!("  {} v{}", config.agent.name, config.agent.version);
    println!("  Workspace: {}", config.agent.workspace.display());
    if config.web.enabled {
        println!(
            "  API:       http://{}:{}{}",
            config.web.host, config.web.port, config.web.api_prefix
        );
    }
    println!("  Press Ctrl-C to stop.");
    println!();

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, stopping agent");
            signal.context("failed to listen for shutdown signal")
        }
        result = join_server(&mut server) => {
            warn!("web server exited, stopping agent");
            result
        }
    };

    shutdown.cancel();
    if let Err(e) = join_server(&mut server).await {
        error!(error = %e, "web server shutdown failed");
    }
    agent.shutdown().await;
    info!("agent stopped gracefully");

    outcome
}

/// Wait for the web server task.  Pending forever when there is none;
/// clears the handle once it has completed.
async fn join_server(server: &mut Option<ServerHandle>) -> Result<()> {
    let Some(handle) = server.as_mut() else {
        return std::future::pending().await;
    };
    let joined = handle.await;
    *server = None;
    joined
        .context("web server task panicked")?
        .context("web server failed")
}

// ---------------------------------------------------------------------------
// Subcommand: config
// ---------------------------------------------------------------------------

fn cmd_config(config_path: &Path, write: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    match write {
        Some(out) => {
            config
                .save(out)
                .with_context(|| format!("failed to write config {}", out.display()))?;
            println!("Configuration written to {}", out.display());
        }
        None => {
            let text = config
                .render(ConfigFormat::from_path(config_path))
                .map_err(anyhow::Error::msg)
                .context("failed to render configuration")?;
            print!("{text}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: tools
// ---------------------------------------------------------------------------

fn cmd_tools(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    let mut definitions: Vec<_> = clawdlocal_adapters::builtin_tools(&config.agent.workspace)
        .iter()
        .map(|tool| tool.definition())
        .collect();
    definitions.sort_by(|a, b| a.name.cmp(&b.name));

    println!("Built-in tools (workspace: {}):", config.agent.workspace.display());
    for def in definitions {
        println!("  {:<16} {}", def.name, def.description);
    }
    Ok(())
}
