//! Pulse CLI

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pulse_config::{load_and_merge, Config, LogFormat};
use pulse_control::{is_plugin_candidate, strategy_for};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "pulsectl")]
#[command(about = "Pulse telemetry control plane", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "PULSE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration files
    Validate {
        /// Configuration files, merged in order
        #[arg(short, long = "config", default_value = "pulse.yaml", num_args = 1..)]
        configs: Vec<PathBuf>,
    },

    /// Print the effective configuration as JSON
    Show {
        /// Configuration files, merged in order
        #[arg(short, long = "config", default_value = "pulse.yaml", num_args = 1..)]
        configs: Vec<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };

    match cli.command {
        Commands::Validate { configs } => {
            init_tracing(&cli.log_level, format)?;
            tracing::info!(files = configs.len(), "Validating configuration");

            match load_and_merge(&configs) {
                Ok(config) => {
                    report(&config);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(error = %e, "Configuration validation failed");
                    std::process::exit(1);
                }
            }
        }

        Commands::Show { configs } => {
            init_tracing(&cli.log_level, format)?;
            let config = load_and_merge(&configs)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }

        Commands::Version => {
            println!("Pulse control plane");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

/// Log a summary of a valid configuration, warning about autoload entries
/// that cannot be loaded as they stand
fn report(config: &Config) {
    let control = &config.control;
    tracing::info!(
        strategy = strategy_for(control.routing_strategy).name(),
        collect_timeout = ?control.collect_timeout,
        publish_timeout = ?control.publish_timeout,
        invariant_policy = ?control.invariant_policy,
        "Configuration is valid"
    );

    for path in &config.plugins.autoload {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Autoload plugin does not exist");
        } else if !is_plugin_candidate(path) {
            tracing::warn!(path = %path.display(), "Autoload entry does not look like a plugin");
        }
    }

    if let Some(dir) = &config.plugins.watch_dir {
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "Plugin watch directory does not exist");
        }
    }
}

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        other => bail!("Invalid log level: {other}"),
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .with(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_target(false).with_level(true))
            .with(filter)
            .init(),
    }

    Ok(())
}
