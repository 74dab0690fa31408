mod app;
mod commands;

use std::path::PathBuf;

use ca_core::config::Config;
use ca_telemetry::logging::{init_logging, init_logging_json};
use clap::{Parser, Subcommand};

use crate::app::AppContext;
use crate::commands::config::ConfigAction;

/// cli-agent -- autonomous coding sessions in the terminal.
#[derive(Parser)]
#[command(name = "cli-agent", version, about)]
struct Cli {
    /// Config file (default: ~/.cli-agent/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overriding the configured level (RUST_LOG wins over both).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session REPL (default when no subcommand is given).
    Repl,

    /// Execute every open issue with retries and print the results.
    Issues {
        /// JSON file holding an array of issues (defaults to the mock set).
        #[arg(long)]
        file: Option<PathBuf>,
        /// Enable fault injection with this per-step probability.
        #[arg(long)]
        fail_rate: Option<f64>,
        /// Progress a step must reach before a fault may fire.
        #[arg(long)]
        min_progress: Option<u8>,
    },

    /// Inspect or reset the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as JSON.
    Show,
    /// Print the config file location.
    Path,
    /// Overwrite the config file with defaults.
    Reset,
}

impl From<&ConfigCommand> for ConfigAction {
    fn from(cmd: &ConfigCommand) -> Self {
        match cmd {
            ConfigCommand::Show => ConfigAction::Show,
            ConfigCommand::Path => ConfigAction::Path,
            ConfigCommand::Reset => ConfigAction::Reset,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, config_path) = match &cli.config {
        Some(path) => (Config::load_or_default(path)?, path.clone()),
        None => (Config::load()?, Config::default_path()),
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    if cli.json_logs || config.logging.json {
        init_logging_json("cli-agent", &level);
    } else {
        init_logging("cli-agent", &level);
    }
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    match cli.command {
        None | Some(Commands::Repl) => {
            let ctx = AppContext::new(&config);
            commands::repl::run(ctx).await?;
        }
        Some(Commands::Issues {
            file,
            fail_rate,
            min_progress,
        }) => {
            let ctx = AppContext::new(&config);
            commands::issues::run(&ctx, file.as_deref(), fail_rate, min_progress).await?;
        }
        Some(Commands::Config { action }) => {
            commands::config::run(&config, &config_path, ConfigAction::from(&action))?;
        }
    }

    Ok(())
}
