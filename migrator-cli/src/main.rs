use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use timeout_migrator::config::{LogFormat, MigratorConfig};
use timeout_migrator::logging;

mod adapters;
mod commands;

use commands::{MigrateArgs, PreviewArgs};

#[derive(Parser, Debug)]
#[command(name = "timeout-migrator")]
#[command(about = "Move scheduled timeouts from a legacy timeout manager to native delayed delivery")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "TIMEOUT_MIGRATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format (overrides the configuration)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show outstanding timeouts per endpoint without changing anything
    Preview(PreviewArgs),

    /// Migrate timeouts, resuming a migration in progress first
    Migrate(MigrateArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = MigratorConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(format) = cli.log_format {
        config.logging.format = format.into();
    }
    logging::init(&config.logging)?;

    match &cli.command {
        Commands::Preview(args) => commands::run_preview(&config, args).await,
        Commands::Migrate(args) => commands::run_migrate(&config, args).await,
    }
}
