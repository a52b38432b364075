//! Append-only CSV ledger
//!
//! One row per task per build. Rows from earlier builds are never rewritten;
//! the header is written only when the file is created.

use super::{ReportWriter, display_path, ensure_parent_dir};
use crate::error::{MetricsError, Result};
use crate::report::BuildReport;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Column header of the ledger
pub const CSV_HEADER: &str =
    "BuildId,Timestamp,Task,Duration_ms,Skipped,OS,Processor,Total_RAM_MB,JVM_Max_Memory_MB";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Appends one row per task to a CSV file
#[derive(Debug, Clone)]
pub struct CsvWriter {
    path: PathBuf,
}

impl CsvWriter {
    /// Writer appending to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows for one build, in identifier order
    pub fn render_rows(report: &BuildReport) -> String {
        let facts = &report.system_facts;
        let timestamp = report.generated_at.format(TIMESTAMP_FORMAT).to_string();
        let os = sanitize(&facts.os_name_and_version);
        let processor = sanitize(&facts.processor_name);

        let mut rows = String::new();
        for task in report.tasks_by_identifier() {
            let _ = writeln!(
                rows,
                "{},{},{},{},{},{},{},{},{}",
                report.build_id,
                timestamp,
                sanitize(&task.identifier),
                task.duration_ms,
                task.skipped,
                os,
                processor,
                facts.total_physical_ram_mb,
                facts.max_heap_mb,
            );
        }
        rows
    }
}

impl ReportWriter for CsvWriter {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn write_report(&self, report: &BuildReport) -> Result<()> {
        ensure_parent_dir(&self.path)?;

        let is_new = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MetricsError::io(&self.path, e))?;

        let mut out = String::new();
        if is_new {
            out.push_str(CSV_HEADER);
            out.push('\n');
        }
        out.push_str(&Self::render_rows(report));

        file.write_all(out.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| MetricsError::io(&self.path, e))?;

        tracing::info!(
            path = %display_path(&self.path).display(),
            rows = report.tasks.len(),
            header = is_new,
            "Build metrics CSV appended"
        );
        Ok(())
    }
}

/// Keep free text from splitting a column
fn sanitize(field: &str) -> String {
    field.replace(',', ";").replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writers::test_support::{record, report};

    fn lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_rows_sorted_by_identifier_with_sanitized_fields() {
        let report = report(
            "csv-1",
            vec![
                record(":lib:test", 200, true, false),
                record(":app:compile,debug", 500, false, true),
            ],
        );

        let rows = CsvWriter::render_rows(&report);
        let rows: Vec<_> = rows.lines().collect();
        assert_eq!(
            rows,
            vec![
                "csv-1,2024-05-01 10:01:02.750,:app:compile;debug,500,false,Linux 6.8.0,Test CPU; 8 cores,16384,4096",
                "csv-1,2024-05-01 10:01:02.750,:lib:test,200,true,Linux 6.8.0,Test CPU; 8 cores,16384,4096",
            ]
        );
        for row in rows {
            assert_eq!(row.split(',').count(), CSV_HEADER.split(',').count());
        }
    }

    #[test]
    fn test_header_once_and_prior_rows_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/build-metrics.csv");
        let writer = CsvWriter::new(&path);

        writer
            .write_report(&report("first", vec![record(":a", 1, false, true), record(":b", 2, false, false)]))
            .unwrap();
        let first = lines(&path);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0], CSV_HEADER);

        writer
            .write_report(&report("second", vec![record(":c", 3, true, false)]))
            .unwrap();
        let second = lines(&path);
        assert_eq!(second.len(), 4);
        assert_eq!(second[..3], first[..]);
        assert_eq!(second.iter().filter(|l| l.as_str() == CSV_HEADER).count(), 1);
        assert!(second[3].starts_with("second,"));
    }

    #[test]
    fn test_existing_file_gets_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        std::fs::write(&path, "previous,row\n").unwrap();

        CsvWriter::new(&path)
            .write_report(&report("next", vec![record(":a", 1, false, false)]))
            .unwrap();

        let content = lines(&path);
        assert_eq!(content[0], "previous,row");
        assert_eq!(content.len(), 2);
        assert!(content[1].starts_with("next,"));
    }

    #[test]
    fn test_unwritable_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let writer = CsvWriter::new(dir.path());
        let result = writer.write_report(&report("x", vec![record(":a", 1, false, false)]));
        assert!(matches!(result, Err(MetricsError::Io { .. })));
    }
}
