// Finding Record Model
// One classified finding of a completed scan

use crate::findings::Finding;
use crate::jobs::ScanId;
use sqlx::FromRow;

/// Finding record in database
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct FindingRecord {
    pub scan_id: String,
    /// Position in the classified list
    pub ordinal: i32,
    pub finding_id: String,
    pub severity: String,
    pub name: String,
    pub path: String,
    pub description: String,
    pub impact: String,
    pub remediation: String,
    /// JSON array of reference URLs
    pub reference_links: String,
    pub status: String,
    pub evidence: Option<String>,
}

impl FindingRecord {
    pub const COLUMNS: [&'static str; 12] = [
        "scan_id",
        "ordinal",
        "finding_id",
        "severity",
        "name",
        "path",
        "description",
        "impact",
        "remediation",
        "reference_links",
        "status",
        "evidence",
    ];

    pub fn from_finding(scan_id: &ScanId, ordinal: usize, finding: &Finding) -> crate::Result<Self> {
        Ok(Self {
            scan_id: scan_id.to_string(),
            ordinal: ordinal as i32,
            finding_id: finding.id.clone(),
            severity: finding.severity.as_str().to_string(),
            name: finding.name.clone(),
            path: finding.path.clone(),
            description: finding.description.clone(),
            impact: finding.impact.clone(),
            remediation: finding.remediation.clone(),
            reference_links: serde_json::to_string(&finding.references)?,
            status: finding.status.as_str().to_string(),
            evidence: finding.evidence.clone(),
        })
    }

    pub fn into_finding(self) -> crate::Result<Finding> {
        Ok(Finding {
            id: self.finding_id,
            severity: self.severity.parse()?,
            name: self.name,
            path: self.path,
            description: self.description,
            impact: self.impact,
            remediation: self.remediation,
            references: serde_json::from_str(&self.reference_links)?,
            status: self.status.parse()?,
            evidence: self.evidence,
        })
    }
}
