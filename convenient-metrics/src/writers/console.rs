//! Console summary

use super::{ReportWriter, render_summary};
use crate::error::{MetricsError, Result};
use crate::report::{BuildReport, CONSOLE_TOP_TASKS};
use std::io::Write;

/// Prints the build summary to stdout
#[derive(Debug, Clone, Copy)]
pub struct ConsoleWriter {
    top: usize,
}

impl ConsoleWriter {
    /// Console writer listing the top 15 classified tasks
    pub fn new() -> Self {
        Self {
            top: CONSOLE_TOP_TASKS,
        }
    }

    /// Text exactly as printed
    pub fn render(&self, report: &BuildReport) -> String {
        format!("\n{}\n", render_summary(report, self.top, false))
    }
}

impl Default for ConsoleWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportWriter for ConsoleWriter {
    fn name(&self) -> &'static str {
        "console"
    }

    fn write_report(&self, report: &BuildReport) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(self.render(report).as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(|e| MetricsError::io("<stdout>", e))
    }
}
