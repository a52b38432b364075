//! Report sinks: console, CSV ledger and text report
//!
//! Writers are independent: each one renders the same [`BuildReport`] and
//! reports its own failure, so the tracker can keep going after one of them
//! fails.

mod console;
mod csv;
mod txt;

pub use console::ConsoleWriter;
pub use csv::{CSV_HEADER, CsvWriter};
pub use txt::TxtWriter;

use crate::error::{MetricsError, Result};
use crate::report::BuildReport;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// A destination for the finished build report
pub trait ReportWriter {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Render and emit the report
    fn write_report(&self, report: &BuildReport) -> Result<()>;
}

const RULE: &str = "=========================================";

/// Summary block shared by the console and text reports
pub(crate) fn render_summary(report: &BuildReport, top: usize, with_timestamp: bool) -> String {
    let facts = &report.system_facts;
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "=== Build Task Metrics Summary ===");
    let _ = writeln!(out, "Build ID: {}", report.build_id);
    if with_timestamp {
        let _ = writeln!(
            out,
            "Timestamp: {}",
            report.generated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    let _ = writeln!(out, "Total build time: {} seconds", report.total_build_secs());

    let _ = writeln!(out, "\n=== System Information ===");
    let _ = writeln!(out, "OS: {}", facts.os_name_and_version);
    let _ = writeln!(out, "Processor: {}", facts.processor_name);
    let _ = writeln!(out, "Total RAM: {} MB", facts.total_physical_ram_mb);
    let _ = writeln!(out, "Max Heap Memory: {} MB", facts.max_heap_mb);

    let ranked = report.top_classified(top);
    if ranked.is_empty() {
        let _ = writeln!(out, "\nNo classified tasks recorded.");
    } else {
        let _ = writeln!(out, "\nTop Classified Tasks (by duration):");
        for task in ranked {
            let _ = writeln!(out, "  {}", task.summary_line());
        }
    }
    let _ = writeln!(out, "{RULE}");
    out
}

/// Create the directory a report file lives in
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|e| MetricsError::io(dir, e))
        }
        _ => Ok(()),
    }
}

/// Absolute form of `path` for log messages
pub(crate) fn display_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::collector::TaskSnapshot;
    use crate::report::BuildReport;
    use crate::sysfacts::SystemFacts;
    use crate::task::TaskRecord;
    use chrono::{Duration, Local, TimeZone};

    pub fn record(id: &str, duration_ms: u64, skipped: bool, is_classified: bool) -> TaskRecord {
        TaskRecord {
            identifier: id.to_string(),
            duration_ms,
            skipped,
            is_classified,
        }
    }

    pub fn report(build_id: &str, records: Vec<TaskRecord>) -> BuildReport {
        let start = Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let now = start + Duration::milliseconds(2_750) + Duration::minutes(1);
        let snapshot: TaskSnapshot = records
            .into_iter()
            .map(|r| (r.identifier.clone(), r))
            .collect();
        BuildReport::assemble(
            snapshot,
            SystemFacts {
                os_name_and_version: "Linux 6.8.0".to_string(),
                processor_name: "Test CPU, 8 cores".to_string(),
                total_physical_ram_mb: 16_384,
                max_heap_mb: 4_096,
            },
            build_id,
            start,
            now,
        )
    }
}
