//! Process-level helpers shared by the subcommands.

use clawdlocal_agent::{LogFormat, LogOutput, config::LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `logging.level`.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match (logging.format, logging.output) {
        (LogFormat::Text, LogOutput::Stdout) => builder.compact().init(),
        (LogFormat::Text, LogOutput::Stderr) => {
            builder.compact().with_writer(std::io::stderr).init();
        }
        (LogFormat::Json, LogOutput::Stdout) => builder.json().init(),
        (LogFormat::Json, LogOutput::Stderr) => {
            builder.json().with_writer(std::io::stderr).init();
        }
    }
}
