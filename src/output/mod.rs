// Output module - Report generation (JSON, CSV, HTML, PDF)

pub mod csv;
pub mod html;
pub mod json;
pub mod pdf;
pub mod report;

pub use report::{Report, ReportSummary};

use crate::jobs::ScanId;
use crate::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Export format of a report download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
    Html,
    Pdf,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Html => "html",
            ReportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Json => "application/json",
            ReportFormat::Csv => "text/csv; charset=utf-8",
            ReportFormat::Html => "text/html; charset=utf-8",
            ReportFormat::Pdf => "application/pdf",
        }
    }

    /// Download file name, e.g. `scan-s_0123...-report.pdf`
    pub fn file_name(&self, scan_id: &ScanId) -> String {
        format!("scan-{}-report.{}", scan_id, self.as_str())
    }

    /// Render the report in this format
    pub fn export(&self, report: &Report) -> Result<Vec<u8>> {
        match self {
            ReportFormat::Json => Ok(json::generate_json(report, true)?.into_bytes()),
            ReportFormat::Csv => Ok(csv::generate_csv(report)?.into_bytes()),
            ReportFormat::Html => Ok(html::generate_html_report(report)?.into_bytes()),
            ReportFormat::Pdf => pdf::generate_pdf(report),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            "html" => Ok(ReportFormat::Html),
            "pdf" => Ok(ReportFormat::Pdf),
            _ => Err(ScanError::UnsupportedFormat(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::report::tests::sample_report;

    #[test]
    fn test_format_parsing() {
        assert_eq!("PDF".parse::<ReportFormat>().unwrap(), ReportFormat::Pdf);
        assert_eq!("csv".parse::<ReportFormat>().unwrap(), ReportFormat::Csv);
        assert!(matches!(
            "xml".parse::<ReportFormat>(),
            Err(ScanError::UnsupportedFormat(_))
        ));
        assert_eq!(ReportFormat::default(), ReportFormat::Json);
    }

    #[test]
    fn test_every_format_exports() {
        let report = sample_report();
        for format in [
            ReportFormat::Json,
            ReportFormat::Csv,
            ReportFormat::Html,
            ReportFormat::Pdf,
        ] {
            let bytes = format.export(&report).unwrap();
            assert!(!bytes.is_empty(), "{} export is empty", format);
        }
    }

    #[test]
    fn test_file_name() {
        let report = sample_report();
        let name = ReportFormat::Csv.file_name(&report.scan_id);
        assert!(name.starts_with("scan-s_"));
        assert!(name.ends_with("-report.csv"));
    }
}
