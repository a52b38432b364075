//! Overwritten text report

use super::{ReportWriter, display_path, ensure_parent_dir, render_summary};
use crate::error::{MetricsError, Result};
use crate::report::{BuildReport, TEXT_TOP_TASKS};
use std::path::{Path, PathBuf};

/// Replaces a text file with the latest build summary
#[derive(Debug, Clone)]
pub struct TxtWriter {
    path: PathBuf,
    top: usize,
}

impl TxtWriter {
    /// Writer listing the top 25 classified tasks into `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            top: TEXT_TOP_TASKS,
        }
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File content for `report`
    pub fn render(&self, report: &BuildReport) -> String {
        render_summary(report, self.top, true)
    }
}

impl ReportWriter for TxtWriter {
    fn name(&self) -> &'static str {
        "txt"
    }

    fn write_report(&self, report: &BuildReport) -> Result<()> {
        ensure_parent_dir(&self.path)?;
        std::fs::write(&self.path, self.render(report))
            .map_err(|e| MetricsError::io(&self.path, e))?;

        tracing::info!(
            path = %display_path(&self.path).display(),
            "Build metrics text report saved"
        );
        Ok(())
    }
}
