mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "stern-insider",
    version,
    about = "Poll Stern Insider Connected leaderboards for your pinball machines",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file (defaults to STERN_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the configured credentials are accepted
    Validate,

    /// Run one poll cycle and print machines with their high scores
    Snapshot {
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the account's teams
    Teams {
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Poll on the configured interval until interrupted
    Run {
        /// Override the poll interval in minutes (30-1440)
        #[arg(long)]
        scan_interval: Option<u64>,

        /// Export Prometheus metrics to this file every minute and on shutdown
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = commands::load_config(cli.config.as_deref())?;

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::info!(username = %config.credentials.username, "stern-insider starting");

    match cli.command {
        Commands::Validate => commands::validate(config).await?,
        Commands::Snapshot { pretty } => commands::snapshot(config, pretty).await?,
        Commands::Teams { pretty } => commands::teams(config, pretty).await?,
        Commands::Run {
            scan_interval,
            metrics_file,
        } => {
            if let Some(minutes) = scan_interval {
                config.polling.scan_interval_minutes = minutes;
                config.validate()?;
            }
            commands::run(config, metrics_file).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("stern_insider=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("stern_insider={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
