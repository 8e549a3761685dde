mod cli;
mod commands;
mod config;
mod error;
mod output;

use crate::{
    cli::{Args, Commands},
    commands::CommandExecutor,
    config::AppConfig,
    error::Result,
};
use clap::Parser;
use colored::*;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet);

    let config = AppConfig::load(args.config.as_deref())?;
    if !config.colored_output {
        colored::control::set_override(false);
    }

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C, shutting down");
            signal_token.cancel();
        }
    });

    let executor = CommandExecutor::new(config, token)?;
    let mut out = std::io::stdout();

    match args.command {
        Commands::Scan { start, end, format } => {
            executor.scan(&mut out, &start, &end, format).await
        }
        Commands::Verify { folder, format } => executor.verify(&mut out, &folder, format).await,
        Commands::Clips {
            start,
            end,
            output_dir,
            limit,
            format,
        } => {
            info!(%start, end = end.as_deref().unwrap_or("live"), "Reconstructing clips");
            executor
                .clips(
                    &mut out,
                    &start,
                    end.as_deref(),
                    output_dir.as_deref(),
                    limit,
                    format,
                )
                .await
        }
    }
}

/// Logs go to stderr so that stdout carries only command output.
fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(verbose),
        )
        .init();
}
