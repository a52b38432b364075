//! Build report assembly
//!
//! Turns a collector snapshot plus system facts into the ordered model every
//! writer renders. The classified ranking is computed once here; writers only
//! truncate it to their own limit.

use crate::collector::TaskSnapshot;
use crate::error::Result;
use crate::sysfacts::SystemFacts;
use crate::task::TaskRecord;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Classified tasks shown on the console
pub const CONSOLE_TOP_TASKS: usize = 15;

/// Classified tasks listed in the text report
pub const TEXT_TOP_TASKS: usize = 25;

/// Aggregate counts over one build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotals {
    /// Distinct task identifiers
    pub task_count: usize,
    /// Tasks that actually ran
    pub executed_count: usize,
    /// Tasks reported as skipped
    pub skipped_count: usize,
    /// Tasks under a classified prefix
    pub classified_count: usize,
    /// Sum of classified task durations
    pub classified_duration_ms: u64,
}

/// Everything known about one finished build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    /// Opaque id of the build
    pub build_id: String,
    /// When tracking started
    pub build_started_at: DateTime<Local>,
    /// When the report was assembled
    pub generated_at: DateTime<Local>,
    /// Wall-clock build time, never negative
    pub total_build_duration_ms: u64,
    /// All tasks, ordered by identifier
    pub tasks: TaskSnapshot,
    /// Classified tasks, longest first, ties by identifier
    pub classified_ranking: Vec<TaskRecord>,
    /// Aggregate counts
    pub totals: ReportTotals,
    /// Host facts at report time
    pub system_facts: SystemFacts,
}

impl BuildReport {
    /// Assemble the report for a build that ends at `now`
    pub fn assemble(
        snapshot: TaskSnapshot,
        system_facts: SystemFacts,
        build_id: impl Into<String>,
        build_started_at: DateTime<Local>,
        now: DateTime<Local>,
    ) -> Self {
        let total_build_duration_ms =
            u64::try_from((now - build_started_at).num_milliseconds()).unwrap_or(0);
        let classified_ranking = rank_classified(&snapshot);
        let totals = ReportTotals::from_tasks(&snapshot);

        Self {
            build_id: build_id.into(),
            build_started_at,
            generated_at: now,
            total_build_duration_ms,
            tasks: snapshot,
            classified_ranking,
            totals,
            system_facts,
        }
    }

    /// Build time in whole seconds (truncated)
    pub fn total_build_secs(&self) -> u64 {
        self.total_build_duration_ms / 1000
    }

    /// The `limit` longest classified tasks
    pub fn top_classified(&self, limit: usize) -> &[TaskRecord] {
        &self.classified_ranking[..limit.min(self.classified_ranking.len())]
    }

    /// Tasks in identifier order
    pub fn tasks_by_identifier(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values()
    }

    /// Pretty JSON form of the report
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl ReportTotals {
    fn from_tasks(snapshot: &TaskSnapshot) -> Self {
        snapshot.values().fold(Self::default(), |mut totals, task| {
            totals.task_count += 1;
            if task.skipped {
                totals.skipped_count += 1;
            } else {
                totals.executed_count += 1;
            }
            if task.is_classified {
                totals.classified_count += 1;
                totals.classified_duration_ms += task.duration_ms;
            }
            totals
        })
    }
}

/// Classified tasks sorted by duration descending, then identifier ascending
pub fn rank_classified(snapshot: &TaskSnapshot) -> Vec<TaskRecord> {
    let mut ranked: Vec<TaskRecord> = snapshot
        .values()
        .filter(|task| task.is_classified)
        .cloned()
        .collect();
    ranked.sort_by(|a, b| {
        b.duration_ms
            .cmp(&a.duration_ms)
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
    ranked
}
