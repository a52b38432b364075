//! Tracker configuration

use crate::error::{MetricsError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the append-only CSV ledger.
pub const DEFAULT_CSV_FILE_NAME: &str = "build-metrics.csv";

/// Default name of the overwritten text report.
pub const DEFAULT_TXT_FILE_NAME: &str = "build-metrics.txt";

/// Default report directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "build/reports";

/// Options controlling where and how reports are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Also write the human-readable text report
    pub export_text_report: bool,

    /// Directory receiving the CSV and text reports
    pub output_directory: PathBuf,

    /// CSV file name, relative to `output_directory`
    pub csv_file_name: String,

    /// Text file name, relative to `output_directory`
    pub txt_file_name: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            export_text_report: false,
            output_directory: PathBuf::from(DEFAULT_OUTPUT_DIRECTORY),
            csv_file_name: DEFAULT_CSV_FILE_NAME.to_string(),
            txt_file_name: DEFAULT_TXT_FILE_NAME.to_string(),
        }
    }
}

impl TrackerConfig {
    /// Config writing into `output_directory` with default file names.
    pub fn in_directory(output_directory: impl AsRef<Path>) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Full path of the CSV ledger.
    pub fn csv_path(&self) -> PathBuf {
        self.output_directory.join(&self.csv_file_name)
    }

    /// Full path of the text report.
    pub fn txt_path(&self) -> PathBuf {
        self.output_directory.join(&self.txt_file_name)
    }

    /// Reject file names that cannot name a file.
    pub fn validate(&self) -> Result<()> {
        for (option, value) in [
            ("csv_file_name", &self.csv_file_name),
            ("txt_file_name", &self.txt_file_name),
        ] {
            if value.trim().is_empty() {
                return Err(MetricsError::InvalidConfig(format!(
                    "{option} must not be empty"
                )));
            }
        }
        if self.export_text_report && self.csv_path() == self.txt_path() {
            return Err(MetricsError::InvalidConfig(
                "csv_file_name and txt_file_name point at the same file".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert!(!config.export_text_report);
        assert_eq!(config.csv_path(), Path::new("build/reports/build-metrics.csv"));
        assert_eq!(config.txt_path(), Path::new("build/reports/build-metrics.txt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"export_text_report": true, "csv_file_name": "times.csv"}"#)
                .unwrap();
        assert!(config.export_text_report);
        assert_eq!(config.csv_file_name, "times.csv");
        assert_eq!(config.txt_file_name, DEFAULT_TXT_FILE_NAME);
    }

    #[test]
    fn test_validate_rejects_empty_and_colliding_names() {
        let mut config = TrackerConfig {
            csv_file_name: "  ".to_string(),
            ..TrackerConfig::default()
        };
        assert!(matches!(config.validate(), Err(MetricsError::InvalidConfig(_))));

        config.csv_file_name = "report".to_string();
        config.txt_file_name = "report".to_string();
        assert!(config.validate().is_ok());

        config.export_text_report = true;
        assert!(config.validate().is_err());
    }
}
