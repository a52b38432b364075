//! Taskmeter command-line interface
//!
//! Taskmeter stands in for a build tool host:
//! - `replay`: feed recorded task completion events to a tracker and write reports
//! - `facts`: print the system facts reports would contain

use clap::{Args, Parser, Subcommand};
use convenient_metrics::config::{
    DEFAULT_CSV_FILE_NAME, DEFAULT_OUTPUT_DIRECTORY, DEFAULT_TXT_FILE_NAME,
};
use std::path::PathBuf;

pub mod facts;
pub mod replay;

/// Taskmeter - build task duration reports
#[derive(Parser)]
#[command(name = "taskmeter")]
#[command(about = "Collect build task durations and write console, CSV and text reports")]
#[command(version)]
pub struct Cli {
    /// Print debug information (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay JSON-lines task completion events as one build
    Replay(ReplayArgs),

    /// Print the host system facts
    Facts {
        /// Print as JSON instead of text
        #[arg(long)]
        json: bool,

        /// Seconds allowed for each system query
        #[arg(long, default_value_t = 10, env = "TASKMETER_COMMAND_TIMEOUT_SECS")]
        command_timeout_secs: u64,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// File with one completion event per line, or "-" for stdin
    #[arg(short, long)]
    pub events: PathBuf,

    /// Project path whose tasks are classified (repeatable)
    #[arg(short, long = "classified", value_name = "PATH")]
    pub classified: Vec<String>,

    /// JSON array of projects ({"path", "plugins"}); mobile projects are classified
    #[arg(long)]
    pub projects: Option<PathBuf>,

    /// Directory receiving the reports
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIRECTORY, env = "TASKMETER_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// CSV file name inside the output directory
    #[arg(long, default_value = DEFAULT_CSV_FILE_NAME, env = "TASKMETER_CSV_FILE")]
    pub csv_file: String,

    /// Text report file name inside the output directory
    #[arg(long, default_value = DEFAULT_TXT_FILE_NAME, env = "TASKMETER_TXT_FILE")]
    pub txt_file: String,

    /// Also write the text report
    #[arg(long, env = "TASKMETER_EXPORT_TXT")]
    pub export_txt: bool,

    /// Threads delivering events (default: logical CPU count)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Seconds allowed for each system query
    #[arg(long, default_value_t = 10, env = "TASKMETER_COMMAND_TIMEOUT_SECS")]
    pub command_timeout_secs: u64,

    /// Also write the full report as JSON to this path
    #[arg(long)]
    pub json_report: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_defaults() {
        let cli = Cli::try_parse_from(["taskmeter", "replay", "--events", "events.jsonl"]).unwrap();
        let Commands::Replay(args) = cli.command else {
            panic!("expected replay");
        };
        assert_eq!(args.events, PathBuf::from("events.jsonl"));
        assert!(args.classified.is_empty());
        assert_eq!(args.csv_file, DEFAULT_CSV_FILE_NAME);
        assert!(args.workers.is_none());
        assert!(!cli.debug);
    }

    #[test]
    fn test_replay_repeated_classified() {
        let cli = Cli::try_parse_from([
            "taskmeter", "replay", "-e", "-", "-c", ":app", "-c", ":feature", "-j", "2", "--export-txt", "-d",
        ])
        .unwrap();
        let Commands::Replay(args) = cli.command else {
            panic!("expected replay");
        };
        assert_eq!(args.classified, vec![":app", ":feature"]);
        assert_eq!(args.workers, Some(2));
        assert!(args.export_txt);
        assert!(cli.debug);
    }

    #[test]
    fn test_replay_requires_events() {
        assert!(Cli::try_parse_from(["taskmeter", "replay"]).is_err());
    }
}
