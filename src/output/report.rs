// Report - summary statistics over a completed scan's findings

use crate::findings::{Finding, Severity};
use crate::jobs::{format_duration, JobStatus, ScanId, ScanJob, ScanMode};
use serde::{Deserialize, Serialize};

/// Counts per severity plus scan duration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
    pub duration_seconds: u64,
    /// Human readable, e.g. `1m 05s`
    pub duration: String,
}

impl ReportSummary {
    pub fn from_findings(findings: &[Finding], duration_seconds: u64) -> Self {
        let mut summary = Self {
            total: findings.len(),
            duration_seconds,
            duration: format_duration(std::time::Duration::from_secs(duration_seconds)),
            ..Self::default()
        };

        for finding in findings {
            match finding.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Info => summary.info += 1,
            }
        }

        summary
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }
}

/// Report of a completed scan. Carries no generation timestamp, so the same
/// job and findings always produce the same report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub scan_id: ScanId,
    pub target: String,
    pub mode: ScanMode,
    pub status: JobStatus,
    pub summary: ReportSummary,
    pub vulnerabilities: Vec<Finding>,
}

impl Report {
    pub fn build(job: &ScanJob, findings: Vec<Finding>) -> Self {
        let duration_seconds = match (job.started_at, job.finished_at) {
            (Some(start), Some(end)) => (end - start).num_seconds().max(0) as u64,
            _ => 0,
        };

        Self {
            scan_id: job.scan_id.clone(),
            target: job.target.clone(),
            mode: job.mode,
            status: job.status,
            summary: ReportSummary::from_findings(&findings, duration_seconds),
            vulnerabilities: findings,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::findings::{classify, RawSignal, SignalKind};
    use crate::target::validate_target;
    use chrono::Duration;

    /// A completed job with one finding of each severity except info
    pub(crate) fn sample_report() -> Report {
        let mut job = ScanJob::new("owner", &validate_target("example.com").unwrap(), ScanMode::Full);
        job.start().unwrap();
        job.complete().unwrap();
        job.finished_at = job.started_at.map(|s| s + Duration::seconds(65));

        let findings = classify(
            job.scan_id.as_str(),
            &[
                RawSignal::new(
                    SignalKind::SqlMetacharAccepted {
                        parameter: "id".to_string(),
                    },
                    "/items",
                )
                .with_evidence("You have an error in your SQL syntax"),
                RawSignal::new(
                    SignalKind::ReflectedScript {
                        parameter: "q".to_string(),
                    },
                    "/search",
                )
                .with_evidence("<script>alert(1)</script>"),
                RawSignal::new(SignalKind::CertificateExpiring { days_left: 12 }, "/"),
                RawSignal::new(SignalKind::MissingCsp, "/"),
            ],
        );

        Report::build(&job, findings)
    }

    #[test]
    fn test_summary_counts() {
        let report = sample_report();
        let summary = &report.summary;
        assert_eq!(summary.total, report.vulnerabilities.len());
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.high, 1);
        assert_eq!(summary.medium, 1);
        assert_eq!(summary.low, 1);
        assert_eq!(summary.info, 0);
        assert_eq!(
            Severity::ALL.iter().map(|s| summary.count(*s)).sum::<usize>(),
            summary.total
        );
    }

    #[test]
    fn test_duration() {
        let report = sample_report();
        assert_eq!(report.summary.duration_seconds, 65);
        assert_eq!(report.summary.duration, "1m 05s");
    }

    #[test]
    fn test_report_json_shape() {
        let json = serde_json::to_value(sample_report()).unwrap();
        assert!(json["scanId"].as_str().unwrap().starts_with("s_"));
        assert_eq!(json["status"], "completed");
        assert_eq!(json["summary"]["total"], 4);
        assert_eq!(json["summary"]["durationSeconds"], 65);
        assert_eq!(json["vulnerabilities"][0]["severity"], "critical");
    }
}
