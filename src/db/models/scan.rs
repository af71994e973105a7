// Scan Record Model
// Represents a scan job row in the database

use super::{from_micros, to_micros};
use crate::jobs::{ScanId, ScanJob};
use crate::ScanError;
use sqlx::FromRow;

/// Scan job record in database
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ScanJobRecord {
    pub seq: i64,
    pub scan_id: String,
    pub owner: String,
    pub target: String,
    pub target_kind: String,
    pub mode: String,
    pub status: String,
    pub progress: i32,
    pub current_stage: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub eta_seconds: Option<i64>,
    pub error: Option<String>,
}

impl ScanJobRecord {
    /// Row for a job; `seq` is assigned by the database on insert
    pub fn from_job(job: &ScanJob) -> Self {
        Self {
            seq: 0,
            scan_id: job.scan_id.to_string(),
            owner: job.owner.clone(),
            target: job.target.clone(),
            target_kind: job.target_kind.as_str().to_string(),
            mode: job.mode.as_str().to_string(),
            status: job.status.as_str().to_string(),
            progress: i32::from(job.progress),
            current_stage: job.current_stage.clone(),
            created_at: to_micros(job.created_at),
            started_at: job.started_at.map(to_micros),
            finished_at: job.finished_at.map(to_micros),
            eta_seconds: job.eta_seconds.map(|s| s as i64),
            error: job.error.clone(),
        }
    }

    pub fn into_job(self) -> crate::Result<ScanJob> {
        let progress = u8::try_from(self.progress)
            .map_err(|_| ScanError::Database(format!("invalid progress {}", self.progress)))?;

        Ok(ScanJob {
            scan_id: ScanId::parse(&self.scan_id)
                .map_err(|_| ScanError::Database(format!("invalid scan id {}", self.scan_id)))?,
            owner: self.owner,
            target: self.target,
            target_kind: self.target_kind.parse()?,
            mode: self.mode.parse()?,
            status: self.status.parse()?,
            progress,
            current_stage: self.current_stage,
            created_at: from_micros(self.created_at)?,
            started_at: self.started_at.map(from_micros).transpose()?,
            finished_at: self.finished_at.map(from_micros).transpose()?,
            eta_seconds: self.eta_seconds.map(|s| s.max(0) as u64),
            error: self.error,
        })
    }
}
