//! Task completion events, per-task records and classification

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Plugin ids marking a project as a mobile/platform project.
pub const MOBILE_PLUGIN_IDS: &[&str] = &[
    "com.android.application",
    "com.android.library",
    "com.android.dynamic-feature",
    "com.android.test",
    "com.android.asset-pack",
];

/// How a task finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    /// Task ran and succeeded
    Success,
    /// Task ran and failed
    Failed,
    /// Task was not executed (up to date, no source, disabled)
    Skipped,
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Success => write!(f, "SUCCESS"),
            TaskOutcome::Failed => write!(f, "FAILED"),
            TaskOutcome::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Task completion notification as delivered by the build tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletion {
    /// Task path (e.g. ":app:compileDebugKotlin")
    pub identifier: String,

    /// Start time, epoch milliseconds
    pub start_time_ms: i64,

    /// End time, epoch milliseconds
    pub end_time_ms: i64,

    /// Outcome of the task
    pub outcome: TaskOutcome,
}

impl TaskCompletion {
    /// Create a completion event
    pub fn new(
        identifier: impl Into<String>,
        start_time_ms: i64,
        end_time_ms: i64,
        outcome: TaskOutcome,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            start_time_ms,
            end_time_ms,
            outcome,
        }
    }

    /// Wall time of the task. Zero when the end precedes the start.
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.end_time_ms.saturating_sub(self.start_time_ms)).unwrap_or(0)
    }

    /// Whether the task was skipped rather than executed
    pub fn skipped(&self) -> bool {
        self.outcome == TaskOutcome::Skipped
    }
}

/// Collected data for one task identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task path, unique within a build
    pub identifier: String,
    /// Execution time, 0 when the event's end preceded its start
    pub duration_ms: u64,
    /// Task was not executed
    pub skipped: bool,
    /// Identifier fell under a classified prefix when the event arrived
    pub is_classified: bool,
}

impl TaskRecord {
    /// Duration in seconds, for display
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// Summary line used by the console and text reports
    pub fn summary_line(&self) -> String {
        format!(
            "{:.3} s - {}{}",
            self.duration_secs(),
            self.identifier,
            if self.skipped { " [SKIPPED]" } else { "" }
        )
    }
}

/// Project known to the build, with the plugins applied to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    /// Project path (e.g. ":app")
    pub path: String,

    /// Ids of plugins applied to the project
    #[serde(default)]
    pub plugins: Vec<String>,
}

/// Frozen set of project path prefixes whose tasks are classified.
///
/// Built once before the first event and shared read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedPrefixes(Arc<BTreeSet<String>>);

impl ClassifiedPrefixes {
    /// Freeze a set of prefixes
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Arc::new(prefixes.into_iter().map(Into::into).collect()))
    }

    /// Prefixes of every project applying one of `plugin_ids`
    pub fn from_projects<'a>(
        projects: impl IntoIterator<Item = &'a ProjectDescriptor>,
        plugin_ids: &[&str],
    ) -> Self {
        Self::new(
            projects
                .into_iter()
                .filter(|p| p.plugins.iter().any(|id| plugin_ids.contains(&id.as_str())))
                .map(|p| p.path.clone()),
        )
    }

    /// Prefixes of every project applying a mobile plugin
    pub fn mobile_projects<'a>(projects: impl IntoIterator<Item = &'a ProjectDescriptor>) -> Self {
        Self::from_projects(projects, MOBILE_PLUGIN_IDS)
    }

    /// Whether `identifier` belongs to one of the prefixes
    pub fn matches(&self, identifier: &str) -> bool {
        classify(identifier, self.0.iter().map(String::as_str))
    }

    /// Number of prefixes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing is classified
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over prefixes in ascending order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// True iff `identifier` equals a prefix or starts with `prefix + ":"`.
pub fn classify<'a>(identifier: &str, prefixes: impl IntoIterator<Item = &'a str>) -> bool {
    prefixes.into_iter().any(|prefix| {
        identifier == prefix
            || identifier
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(':'))
    })
}
