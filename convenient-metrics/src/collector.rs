//! Thread-safe sink for task completion events
//!
//! Completion events may arrive from several notifier threads at once. Each
//! event replaces the whole record for its identifier under a single short
//! lock, so a snapshot never observes a half-updated record.

use crate::task::{ClassifiedPrefixes, TaskCompletion, TaskRecord};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Immutable copy of collected records, ordered by identifier
pub type TaskSnapshot = BTreeMap<String, TaskRecord>;

/// Task event collector
#[derive(Debug)]
pub struct TaskEventCollector {
    classified: ClassifiedPrefixes,
    records: Mutex<HashMap<String, TaskRecord>>,
}

impl TaskEventCollector {
    /// Create an empty collector classifying against a frozen prefix set
    pub fn new(classified: ClassifiedPrefixes) -> Self {
        Self {
            classified,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Prefix set used for classification
    pub fn classified_prefixes(&self) -> &ClassifiedPrefixes {
        &self.classified
    }

    /// Store the outcome of one task. A later call for the same identifier wins.
    pub fn record_completion(
        &self,
        identifier: impl Into<String>,
        duration_ms: u64,
        skipped: bool,
    ) -> TaskRecord {
        let identifier = identifier.into();
        let record = TaskRecord {
            is_classified: self.classified.matches(&identifier),
            identifier,
            duration_ms,
            skipped,
        };

        let replaced = self
            .lock()
            .insert(record.identifier.clone(), record.clone());

        tracing::trace!(
            task = %record.identifier,
            duration_ms = record.duration_ms,
            skipped = record.skipped,
            classified = record.is_classified,
            replaced = replaced.is_some(),
            "Task completion recorded"
        );

        record
    }

    /// Store a completion event as delivered by the build tool
    pub fn record_event(&self, event: &TaskCompletion) -> TaskRecord {
        if event.end_time_ms < event.start_time_ms {
            tracing::debug!(
                task = %event.identifier,
                start_time_ms = event.start_time_ms,
                end_time_ms = event.end_time_ms,
                "Task ended before it started, recording zero duration"
            );
        }
        self.record_completion(event.identifier.clone(), event.duration_ms(), event.skipped())
    }

    /// Copy of all records collected so far
    pub fn snapshot(&self) -> TaskSnapshot {
        self.lock()
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }

    /// Number of distinct identifiers seen
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no event was recorded
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking writer cannot leave a record half-written: inserts replace
    // whole values, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TaskEventCollector {
    fn default() -> Self {
        Self::new(ClassifiedPrefixes::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskOutcome;
    use std::sync::Arc;

    #[test]
    fn test_last_write_wins() {
        let collector = TaskEventCollector::new(ClassifiedPrefixes::new([":app"]));

        let _ = collector.record_completion(":app:compile", 100, false);
        let _ = collector.record_completion(":lib:test", 50, true);
        let _ = collector.record_completion(":app:compile", 700, true);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.len(), 2);

        let compile = &snapshot[":app:compile"];
        assert_eq!(compile.duration_ms, 700);
        assert!(compile.skipped);
        assert!(compile.is_classified);

        let test = &snapshot[":lib:test"];
        assert!(!test.is_classified);
    }

    #[test]
    fn test_snapshot_is_detached_and_ordered() {
        let collector = TaskEventCollector::default();
        let _ = collector.record_completion(":b", 1, false);
        let _ = collector.record_completion(":a", 2, false);

        let snapshot = collector.snapshot();
        let _ = collector.record_completion(":c", 3, false);

        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec![":a", ":b"]);
        assert_eq!(collector.len(), 3);
    }

    #[test]
    fn test_record_event_clamps_and_marks_skipped() {
        let collector = TaskEventCollector::new(ClassifiedPrefixes::new([":app"]));
        let record = collector.record_event(&TaskCompletion::new(
            ":app:lint",
            5_000,
            4_000,
            TaskOutcome::Skipped,
        ));

        assert_eq!(record.duration_ms, 0);
        assert!(record.skipped);
        assert!(record.is_classified);

        let failed = collector.record_event(&TaskCompletion::new(
            ":app:test",
            0,
            250,
            TaskOutcome::Failed,
        ));
        assert!(!failed.skipped);
        assert_eq!(failed.duration_ms, 250);
    }

    #[test]
    fn test_concurrent_writers() {
        let collector = Arc::new(TaskEventCollector::new(ClassifiedPrefixes::new([":app"])));

        std::thread::scope(|scope| {
            for worker in 0..8u64 {
                let collector = Arc::clone(&collector);
                let _ = scope.spawn(move || {
                    for i in 0..250u64 {
                        let _ = collector.record_completion(format!(":app:task{i}"), worker, false);
                        let _ =
                            collector.record_completion(format!(":w{worker}:task{i}"), i, i % 2 == 0);
                    }
                });
            }
        });

        let snapshot = collector.snapshot();
        // 250 shared identifiers + 8 * 250 per-worker identifiers
        assert_eq!(snapshot.len(), 250 + 8 * 250);
        for i in 0..250u64 {
            let shared = &snapshot[&format!(":app:task{i}")];
            assert!(shared.duration_ms < 8);
            assert!(shared.is_classified);
        }
        let own = &snapshot[":w3:task10"];
        assert_eq!(own.duration_ms, 10);
        assert!(own.skipped);
        assert!(!own.is_classified);
    }
}
