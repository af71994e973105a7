// CSV Output Module

use crate::output::Report;
use crate::Result;
use csv::Writer;

const HEADER: [&str; 10] = [
    "id",
    "severity",
    "name",
    "path",
    "description",
    "impact",
    "remediation",
    "references",
    "status",
    "evidence",
];

/// Generate CSV output, one row per finding
pub fn generate_csv(report: &Report) -> Result<String> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;

    for finding in &report.vulnerabilities {
        let references = finding.references.join(" ");
        writer.write_record([
            finding.id.as_str(),
            finding.severity.as_str(),
            finding.name.as_str(),
            finding.path.as_str(),
            finding.description.as_str(),
            finding.impact.as_str(),
            finding.remediation.as_str(),
            references.as_str(),
            finding.status.as_str(),
            finding.evidence.as_deref().unwrap_or(""),
        ])?;
    }

    let bytes = writer.into_inner()?;
    String::from_utf8(bytes).map_err(|e| crate::ScanError::Other(format!("CSV encoding: {}", e)))
}
