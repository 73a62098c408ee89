//! Skiff CLI entry point

use clap::Parser;
use console::style;
use skiff::cancel;
use skiff::cli::{Cli, Commands};
use skiff::config::{Config, ConfigManager};
use skiff::error::SkiffResult;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

/// 0 = warn (spinners only), 1 = info, 2+ = debug. `RUST_LOG` wins when set.
fn init_logging(verbose: u8, config: &Config) {
    let level = match verbose {
        0 => "skiff=warn",
        1 => "skiff=info",
        _ => "skiff=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

async fn run() -> SkiffResult<()> {
    let cli = Cli::parse();

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = manager.load().await?;

    init_logging(cli.verbose, &config);
    skiff::ui::init_theme();
    debug!("Using config {}", manager.path().display());

    let (handle, signal) = cancel::channel();
    let interrupt = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            interrupt.cancel("interrupted");
        }
    });

    match cli.command {
        Commands::Build(args) => skiff::cli::commands::build(args, &config, &handle, &signal).await,
        Commands::Cache(args) => skiff::cli::commands::cache(args, &config, &signal).await,
        Commands::Config(args) => skiff::cli::commands::config(args, &config, &manager).await,
    }
}
