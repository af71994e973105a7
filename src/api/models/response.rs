// API Response Models

use crate::jobs::{JobStatus, ScanId, ScanJob, ScanMode};
use crate::output::ReportSummary;
use crate::target::TargetKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Returned when a scan is created
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCreatedResponse {
    pub scan_id: ScanId,
    pub target: String,
    pub mode: ScanMode,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&ScanJob> for ScanCreatedResponse {
    fn from(job: &ScanJob) -> Self {
        Self {
            scan_id: job.scan_id.clone(),
            target: job.target.clone(),
            mode: job.mode,
            status: job.status,
            created_at: job.created_at,
        }
    }
}

/// Scan status response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatusResponse {
    pub scan_id: ScanId,
    pub target: String,
    pub target_kind: TargetKind,
    pub mode: ScanMode,
    pub status: JobStatus,

    /// Progress percentage (0-100)
    pub progress: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,

    pub created_at: DateTime<Utc>,

    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Seconds until completion
    pub estimated_time_left: Option<u64>,

    /// Failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ScanJob> for ScanStatusResponse {
    fn from(job: &ScanJob) -> Self {
        Self {
            scan_id: job.scan_id.clone(),
            target: job.target.clone(),
            target_kind: job.target_kind,
            mode: job.mode,
            status: job.status,
            progress: job.progress,
            current_stage: job.current_stage.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            estimated_time_left: job.eta_seconds,
            error: job.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub scan_id: ScanId,
    pub status: JobStatus,
}

/// One row of the scan history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub scan_id: ScanId,
    pub target: String,
    pub mode: ScanMode,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,

    /// Completed scans only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReportSummary>,

    /// Completed scans only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Running scans only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl HistoryItem {
    pub fn new(job: &ScanJob, summary: Option<ReportSummary>) -> Self {
        let running = job.status == JobStatus::Running;
        Self {
            scan_id: job.scan_id.clone(),
            target: job.target.clone(),
            mode: job.mode,
            status: job.status,
            created_at: job.created_at,
            duration: summary.as_ref().map(|s| s.duration.clone()),
            summary,
            progress: running.then_some(job.progress),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub scans: Vec<HistoryItem>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_scans: usize,
    pub queued_scans: usize,
    /// Store backend and its state, e.g. `sqlite: connected`
    pub database: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::validate_target;

    fn job() -> ScanJob {
        ScanJob::new("u", &validate_target("example.com").unwrap(), ScanMode::Quick)
    }

    #[test]
    fn test_status_response_keeps_nulls_for_polling_fields() {
        let json = serde_json::to_value(ScanStatusResponse::from(&job())).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["progress"], 0);
        assert!(json["startedAt"].is_null());
        assert!(json.as_object().unwrap().contains_key("estimatedTimeLeft"));
        assert!(!json.as_object().unwrap().contains_key("error"));
    }

    #[test]
    fn test_history_item_fields_by_status() {
        let mut job = job();
        job.start().unwrap();
        job.record_progress(30, None, None).unwrap();
        let running = serde_json::to_value(HistoryItem::new(&job, None)).unwrap();
        assert_eq!(running["progress"], 30);
        assert!(running.get("summary").is_none());

        job.complete().unwrap();
        let summary = ReportSummary::from_findings(&[], 5);
        let done = serde_json::to_value(HistoryItem::new(&job, Some(summary))).unwrap();
        assert!(done.get("progress").is_none());
        assert_eq!(done["summary"]["total"], 0);
        assert_eq!(done["duration"], "5s");
    }
}
