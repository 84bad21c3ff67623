mod json;
mod terminal;

pub use json::JsonReporter;
pub use terminal::TerminalReporter;

use crate::agent::AgentReport;
use crate::coordinator::CoordinatorReport;
use miette::Result;
use std::path::PathBuf;

/// Human-readable size, two decimals at most: `1536` becomes `1.5 KB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", (value * 100.0).round() / 100.0, UNITS[unit])
}

/// Output format for run summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Terminal,
    Json,
}

/// Prints agent and coordinator results in the chosen format
pub struct Reporter {
    format: ReportFormat,
    output_path: Option<PathBuf>,
    file_lists: bool,
}

impl Reporter {
    pub fn new(format: ReportFormat, output_path: Option<PathBuf>) -> Self {
        Self {
            format,
            output_path,
            file_lists: true,
        }
    }

    /// List individual files in terminal summaries
    pub fn with_file_lists(mut self, show: bool) -> Self {
        self.file_lists = show;
        self
    }

    pub fn report_agent(&self, report: &AgentReport) -> Result<()> {
        match self.format {
            ReportFormat::Terminal => {
                TerminalReporter::new().with_files(self.file_lists).report_agent(report);
                Ok(())
            }
            ReportFormat::Json => JsonReporter::new(self.output_path.clone()).report(report),
        }
    }

    pub fn report_coordinator(&self, report: &CoordinatorReport) -> Result<()> {
        match self.format {
            ReportFormat::Terminal => {
                TerminalReporter::new().with_files(self.file_lists).report_coordinator(report);
                Ok(())
            }
            ReportFormat::Json => JsonReporter::new(self.output_path.clone()).report(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }
}
