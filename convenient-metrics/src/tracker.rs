//! Build-scoped tracker tying collection and reporting together
//!
//! A [`TrackerService`] is created when the build starts, receives every task
//! completion through [`TrackerService::on_task_completion`] (or the closure
//! from [`TrackerService::completion_handler`]) and writes all reports once,
//! when the build tool calls [`TrackerService::on_build_finished`].
//!
//! The build tool must not deliver completions after it calls
//! `on_build_finished`; any that still arrive are dropped and logged. A
//! completion racing the callback is logged as possibly missing from the
//! report.

use crate::collector::TaskEventCollector;
use crate::config::TrackerConfig;
use crate::error::{MetricsError, Result};
use crate::report::BuildReport;
use crate::sysfacts::SystemFactProvider;
use crate::task::{ClassifiedPrefixes, TaskCompletion};
use crate::writers::{ConsoleWriter, CsvWriter, ReportWriter, TxtWriter};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrackerState {
    /// Build started, nothing recorded yet
    Created = 0,
    /// At least one completion recorded
    Collecting = 1,
    /// Report is being assembled and written
    Finalizing = 2,
    /// Reports written; terminal
    Closed = 3,
}

impl TrackerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TrackerState::Created,
            1 => TrackerState::Collecting,
            2 => TrackerState::Finalizing,
            _ => TrackerState::Closed,
        }
    }

    fn accepts_events(self) -> bool {
        matches!(self, TrackerState::Created | TrackerState::Collecting)
    }
}

impl std::fmt::Display for TrackerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerState::Created => write!(f, "created"),
            TrackerState::Collecting => write!(f, "collecting"),
            TrackerState::Finalizing => write!(f, "finalizing"),
            TrackerState::Closed => write!(f, "closed"),
        }
    }
}

/// Outcome of each writer during finalization
#[derive(Debug)]
pub struct WriterOutcome {
    /// Writer name ("console", "csv", "txt")
    pub writer: &'static str,
    /// Error raised by the writer, if any
    pub error: Option<MetricsError>,
}

/// Result of finalizing a build
#[derive(Debug)]
pub struct FinalizedBuild {
    /// Report handed to the writers
    pub report: BuildReport,
    /// Per-writer outcome, in the order the writers ran
    pub writers: Vec<WriterOutcome>,
}

impl FinalizedBuild {
    /// True when every writer succeeded
    pub fn all_written(&self) -> bool {
        self.writers.iter().all(|w| w.error.is_none())
    }
}

/// Tracks task durations for one build and reports them when it ends
#[derive(Debug)]
pub struct TrackerService {
    config: TrackerConfig,
    collector: TaskEventCollector,
    system_facts: Arc<SystemFactProvider>,
    build_id: String,
    build_started_at: DateTime<Local>,
    state: AtomicU8,
}

impl TrackerService {
    /// Start tracking a build that begins now
    pub fn new(
        config: TrackerConfig,
        classified: ClassifiedPrefixes,
        system_facts: Arc<SystemFactProvider>,
    ) -> Self {
        Self::starting_at(
            config,
            classified,
            system_facts,
            uuid::Uuid::new_v4().to_string(),
            Local::now(),
        )
    }

    /// Start tracking with an explicit build id and start time
    pub fn starting_at(
        config: TrackerConfig,
        classified: ClassifiedPrefixes,
        system_facts: Arc<SystemFactProvider>,
        build_id: impl Into<String>,
        build_started_at: DateTime<Local>,
    ) -> Self {
        let build_id = build_id.into();
        tracing::info!(
            build_id = %build_id,
            classified_prefixes = classified.len(),
            output_dir = %config.output_directory.display(),
            export_text_report = config.export_text_report,
            "Build metrics tracking started"
        );

        Self {
            config,
            collector: TaskEventCollector::new(classified),
            system_facts,
            build_id,
            build_started_at,
            state: AtomicU8::new(TrackerState::Created as u8),
        }
    }

    /// Opaque id of the tracked build
    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> TrackerState {
        TrackerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Configuration in use
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Collected records (read-only view)
    pub fn collector(&self) -> &TaskEventCollector {
        &self.collector
    }

    /// Record one task completion
    pub fn on_task_completion(&self, event: &TaskCompletion) {
        let state = self.state();
        if !state.accepts_events() {
            tracing::warn!(
                build_id = %self.build_id,
                task = %event.identifier,
                %state,
                "Task completion after build finished, ignoring"
            );
            return;
        }

        let _ = self.collector.record_event(event);
        if let Err(current) = self.state.compare_exchange(
            TrackerState::Created as u8,
            TrackerState::Collecting as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            let state = TrackerState::from_u8(current);
            if !state.accepts_events() {
                tracing::warn!(
                    build_id = %self.build_id,
                    task = %event.identifier,
                    %state,
                    "Task completion raced build finish, may be missing from report"
                );
            }
        }
    }

    /// Closure to register with the build tool's completion notifier
    pub fn completion_handler(self: &Arc<Self>) -> impl Fn(&TaskCompletion) + Send + Sync + 'static {
        let tracker = Arc::clone(self);
        move |event| tracker.on_task_completion(event)
    }

    /// End-of-build callback: assemble the report and run every writer.
    ///
    /// Runs once. Writer failures are logged and returned, never raised. A
    /// second call logs a warning and returns `None`.
    pub fn on_build_finished(&self) -> Option<FinalizedBuild> {
        self.finish_at(Local::now())
    }

    /// [`Self::on_build_finished`] with an explicit end time
    pub fn finish_at(&self, now: DateTime<Local>) -> Option<FinalizedBuild> {
        if let Err(e) = self.begin_finalizing() {
            tracing::warn!(error = %e, "Ignoring repeated end-of-build callback");
            return None;
        }
        tracing::info!(build_id = %self.build_id, "Build finished, generating reports...");

        let report = BuildReport::assemble(
            self.collector.snapshot(),
            self.system_facts.snapshot(),
            self.build_id.clone(),
            self.build_started_at,
            now,
        );

        let totals = report.totals;
        tracing::info!(
            build_id = %report.build_id,
            total_build_duration_ms = report.total_build_duration_ms,
            tasks = totals.task_count,
            executed = totals.executed_count,
            skipped = totals.skipped_count,
            classified = totals.classified_count,
            classified_duration_ms = totals.classified_duration_ms,
            "Build report assembled"
        );

        let writers = self
            .writers()
            .iter()
            .map(|writer| {
                let error = writer.write_report(&report).err();
                if let Some(ref e) = error {
                    tracing::error!(
                        build_id = %report.build_id,
                        writer = writer.name(),
                        error = %e,
                        "Error writing build report"
                    );
                }
                WriterOutcome {
                    writer: writer.name(),
                    error,
                }
            })
            .collect();

        self.state.store(TrackerState::Closed as u8, Ordering::Release);
        tracing::info!(build_id = %self.build_id, "Reports generated.");

        Some(FinalizedBuild { report, writers })
    }

    fn begin_finalizing(&self) -> Result<()> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                TrackerState::from_u8(current)
                    .accepts_events()
                    .then_some(TrackerState::Finalizing as u8)
            })
            .map(|_| ())
            .map_err(|current| {
                tracing::debug!(
                    build_id = %self.build_id,
                    state = %TrackerState::from_u8(current),
                    "Finalization refused"
                );
                MetricsError::AlreadyFinalized(self.build_id.clone())
            })
    }

    fn writers(&self) -> Vec<Box<dyn ReportWriter>> {
        let mut writers: Vec<Box<dyn ReportWriter>> = vec![
            Box::new(ConsoleWriter::new()),
            Box::new(CsvWriter::new(self.config.csv_path())),
        ];
        if self.config.export_text_report {
            writers.push(Box::new(TxtWriter::new(self.config.txt_path())));
        }
        writers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sysfacts::{CommandOutput, HostProbe, OsFamily};
    use crate::task::TaskOutcome;
    use chrono::{Duration, TimeZone};
    use tracing_test::traced_test;

    struct StaticHost;

    impl HostProbe for StaticHost {
        fn os_family(&self) -> OsFamily {
            OsFamily::Linux
        }
        fn os_name(&self) -> Option<String> {
            Some("Linux".to_string())
        }
        fn os_version(&self) -> Option<String> {
            Some("6.8.0".to_string())
        }
        fn env_var(&self, _key: &str) -> Option<String> {
            None
        }
        fn total_memory_bytes(&self) -> Option<u64> {
            Some(16 * 1024 * 1024 * 1024)
        }
        fn max_heap_bytes(&self) -> Option<u64> {
            Some(512 * 1024 * 1024)
        }
        fn run_command(&self, _program: &str, _args: &[&str]) -> Result<CommandOutput> {
            Ok(CommandOutput {
                success: true,
                stdout: "model name : Fake CPU\n".to_string(),
            })
        }
    }

    fn tracker(config: TrackerConfig) -> TrackerService {
        TrackerService::starting_at(
            config,
            ClassifiedPrefixes::new([":app"]),
            Arc::new(SystemFactProvider::new(StaticHost)),
            "test-build",
            Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_state_machine() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(TrackerConfig::in_directory(dir.path()));
        assert_eq!(tracker.state(), TrackerState::Created);

        tracker.on_task_completion(&TaskCompletion::new(":app:compile", 0, 500, TaskOutcome::Success));
        assert_eq!(tracker.state(), TrackerState::Collecting);

        let finished = tracker.on_build_finished().unwrap();
        assert_eq!(tracker.state(), TrackerState::Closed);
        assert!(finished.all_written());
        assert_eq!(
            finished.writers.iter().map(|w| w.writer).collect::<Vec<_>>(),
            vec!["console", "csv"]
        );
        assert_eq!(finished.report.system_facts.processor_name, "Fake CPU");
        assert_eq!(finished.report.system_facts.max_heap_mb, 512);
    }

    #[test]
    #[traced_test]
    fn test_finalize_only_once_and_late_events_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(TrackerConfig::in_directory(dir.path()));

        let start = Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let finished = tracker.finish_at(start + Duration::seconds(3)).unwrap();
        assert_eq!(finished.report.total_build_duration_ms, 3_000);
        assert!(finished.report.tasks.is_empty());

        tracker.on_task_completion(&TaskCompletion::new(":app:late", 0, 1, TaskOutcome::Success));
        assert!(tracker.collector().is_empty());
        assert!(logs_contain("Task completion after build finished"));

        assert!(tracker.on_build_finished().is_none());
        assert!(logs_contain("Ignoring repeated end-of-build callback"));
        assert!(logs_contain("Build test-build was already finalized"));
        assert_eq!(tracker.state(), TrackerState::Closed);

        let csv = std::fs::read_to_string(dir.path().join("build-metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    #[traced_test]
    fn test_failing_writer_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let config = TrackerConfig {
            export_text_report: true,
            output_directory: dir.path().to_path_buf(),
            csv_file_name: "blocker/metrics.csv".to_string(),
            txt_file_name: "metrics.txt".to_string(),
        };
        let tracker = tracker(config);
        tracker.on_task_completion(&TaskCompletion::new(":app:compile", 0, 500, TaskOutcome::Success));

        let finished = tracker.on_build_finished().unwrap();
        assert!(!finished.all_written());
        let failed: Vec<_> = finished
            .writers
            .iter()
            .filter(|w| w.error.is_some())
            .map(|w| w.writer)
            .collect();
        assert_eq!(failed, vec!["csv"]);
        assert!(logs_contain("Error writing build report"));

        let txt = std::fs::read_to_string(dir.path().join("metrics.txt")).unwrap();
        assert!(txt.contains("  0.500 s - :app:compile\n"));
        assert_eq!(tracker.state(), TrackerState::Closed);
    }

    #[test]
    #[traced_test]
    fn test_completions_racing_finish_are_reported_or_logged() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(tracker(TrackerConfig::in_directory(dir.path())));
        let handler = tracker.completion_handler();
        let ids: Vec<String> = (0..2_000).map(|i| format!(":app:t{i}:compile")).collect();

        let finished = std::thread::scope(|scope| {
            let finisher = scope.spawn(|| tracker.on_build_finished());
            for id in &ids {
                handler(&TaskCompletion::new(id.as_str(), 0, 1, TaskOutcome::Success));
            }
            finisher.join().unwrap().unwrap()
        });

        for id in ids.iter().filter(|id| !finished.report.tasks.contains_key(*id)) {
            assert!(logs_contain(&format!("task={id}")), "{id} neither reported nor logged");
        }
    }

    #[test]
    fn test_handler_from_many_threads() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(tracker(TrackerConfig::in_directory(dir.path())));
        let handler = tracker.completion_handler();

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let handler = &handler;
                let _ = scope.spawn(move || {
                    for i in 0..50 {
                        handler(&TaskCompletion::new(
                            format!(":app:w{worker}t{i}"),
                            0,
                            i,
                            TaskOutcome::Success,
                        ));
                    }
                });
            }
        });

        assert_eq!(tracker.collector().len(), 200);
        let finished = tracker.on_build_finished().unwrap();
        assert_eq!(finished.report.totals.classified_count, 200);
        assert_eq!(finished.report.classified_ranking[0].duration_ms, 49);
    }
}
