//! Taskmeter - build task duration reports
//!
//! Plays the part of the build tool host for `convenient-metrics`:
//! 1. Freeze the classified project prefixes
//! 2. Deliver task completion events from worker threads
//! 3. Fire the end-of-build callback, which writes console, CSV and text reports

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "taskmeter=debug,convenient_metrics=debug"
    } else {
        "taskmeter=info,convenient_metrics=info"
    };

    // Logs go to stderr; stdout carries the console report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Replay(args) => commands::replay::execute(&args),
        Commands::Facts {
            json,
            command_timeout_secs,
        } => commands::facts::execute(json, command_timeout_secs),
    }
}
