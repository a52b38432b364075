//! Build task metrics: collect per-task durations and report them at build end.
//!
//! This crate provides the engine behind build timing reports:
//! - A thread-safe collector keyed by task identifier
//! - Classification of tasks by project-path prefix
//! - Lazily resolved, memoized host facts (OS, CPU, RAM, heap limit)
//! - Report assembly with a ranked list of classified tasks
//! - Console, append-only CSV and overwrite TXT writers
//!
//! # Example
//!
//! ```no_run
//! use convenient_metrics::{
//!     ClassifiedPrefixes, SystemFactProvider, TaskCompletion, TaskOutcome, TrackerConfig,
//!     TrackerService,
//! };
//! use std::sync::Arc;
//!
//! let tracker = Arc::new(TrackerService::new(
//!     TrackerConfig::in_directory("build/reports"),
//!     ClassifiedPrefixes::new([":app"]),
//!     Arc::new(SystemFactProvider::local()),
//! ));
//!
//! let on_complete = tracker.completion_handler();
//! on_complete(&TaskCompletion::new(":app:compile", 0, 500, TaskOutcome::Success));
//!
//! if let Some(finished) = tracker.on_build_finished() {
//!     println!("{} tasks", finished.report.totals.task_count);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(unused_results)]

pub mod collector;
pub mod config;
pub mod error;
pub mod report;
pub mod sysfacts;
pub mod task;
pub mod tracker;
pub mod writers;

pub use collector::{TaskEventCollector, TaskSnapshot};
pub use config::TrackerConfig;
pub use error::{MetricsError, Result};
pub use report::{BuildReport, ReportTotals, rank_classified};
pub use sysfacts::{HostProbe, LocalHost, OsFamily, SystemFactProvider, SystemFacts};
pub use task::{
    ClassifiedPrefixes, ProjectDescriptor, TaskCompletion, TaskOutcome, TaskRecord, classify,
};
pub use tracker::{FinalizedBuild, TrackerService, TrackerState, WriterOutcome};
pub use writers::{ConsoleWriter, CsvWriter, ReportWriter, TxtWriter};
