//! Error types for metrics collection and reporting.

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised inside the metrics engine.
///
/// The public fact accessors and
/// [`TrackerService::on_build_finished`](crate::TrackerService::on_build_finished)
/// never return these; they log them and carry on with sentinel values.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Filesystem error while writing a report
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory being written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Report serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// External command could not be started or its output not read
    #[error("Failed to execute command '{command}': {source}")]
    CommandSpawn {
        /// Command line
        command: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// External command exceeded its time budget and was killed
    #[error("Command '{command}' timed out after {timeout:?}")]
    CommandTimeout {
        /// Command line
        command: String,
        /// Budget that was exceeded
        timeout: Duration,
    },

    /// Waiting on an external command was interrupted
    #[error("Command execution interrupted '{command}'")]
    CommandInterrupted {
        /// Command line
        command: String,
    },

    /// Configuration value rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The end-of-build callback already ran
    #[error("Build {0} was already finalized")]
    AlreadyFinalized(String),
}

impl MetricsError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
