// Scan Job - lifecycle state machine for a single scan
//
// queued -> running -> completed | failed | canceled
// queued -> canceled
//
// progress never decreases while running and is 100 exactly when completed.

use super::{now, JobStatus, ScanId, ScanMode};
use crate::target::{ScanTarget, TargetKind};
use crate::{Result, ScanError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Highest progress a job can report before it completes
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Scan job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanJob {
    /// Unique job ID
    pub scan_id: ScanId,

    /// Opaque id of the submitting user
    pub owner: String,

    /// Canonical target
    pub target: String,

    pub target_kind: TargetKind,

    pub mode: ScanMode,

    /// Current status
    pub status: JobStatus,

    /// Progress percentage (0-100)
    pub progress: u8,

    /// Stage currently running
    pub current_stage: Option<String>,

    /// When job was queued
    pub created_at: DateTime<Utc>,

    /// When job started
    pub started_at: Option<DateTime<Utc>>,

    /// When job reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,

    /// ETA in seconds
    pub eta_seconds: Option<u64>,

    /// Failure reason (if failed)
    pub error: Option<String>,
}

impl ScanJob {
    /// Create new queued scan job
    pub fn new(owner: impl Into<String>, target: &ScanTarget, mode: ScanMode) -> Self {
        Self {
            scan_id: ScanId::generate(),
            owner: owner.into(),
            target: target.canonical(),
            target_kind: target.kind(),
            mode,
            status: JobStatus::Queued,
            progress: 0,
            current_stage: None,
            created_at: now(),
            started_at: None,
            finished_at: None,
            eta_seconds: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time spent running so far, or total run time once finished
    pub fn elapsed(&self) -> Duration {
        let Some(started) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - started).to_std().unwrap_or(Duration::ZERO)
    }

    /// Mark as started
    pub fn start(&mut self) -> Result<()> {
        self.require(&[JobStatus::Queued], "start")?;
        self.status = JobStatus::Running;
        self.started_at = Some(now());
        self.progress = 0;
        Ok(())
    }

    /// Record progress and ETA. Progress is capped at 99 and never moves
    /// backwards; returns whether the stored progress changed.
    pub fn record_progress(
        &mut self,
        progress: u8,
        stage: Option<&str>,
        eta_seconds: Option<u64>,
    ) -> Result<bool> {
        self.require(&[JobStatus::Running], "record progress for")?;

        if let Some(stage) = stage {
            self.current_stage = Some(stage.to_string());
        }
        self.eta_seconds = eta_seconds;

        let capped = progress.min(MAX_RUNNING_PROGRESS);
        if capped > self.progress {
            self.progress = capped;
            return Ok(true);
        }
        Ok(false)
    }

    /// Mark as completed
    pub fn complete(&mut self) -> Result<()> {
        self.require(&[JobStatus::Running], "complete")?;
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.current_stage = None;
        self.finished_at = Some(now());
        self.eta_seconds = None;
        Ok(())
    }

    /// Mark as failed; progress is preserved
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.require(&[JobStatus::Running], "fail")?;
        self.status = JobStatus::Failed;
        self.error = Some(reason.into());
        self.finished_at = Some(now());
        self.eta_seconds = None;
        Ok(())
    }

    /// Mark as cancelled
    pub fn cancel(&mut self) -> Result<()> {
        self.require(&[JobStatus::Queued, JobStatus::Running], "cancel")?;
        self.status = JobStatus::Canceled;
        self.finished_at = Some(now());
        self.eta_seconds = None;
        Ok(())
    }

    fn require(&self, allowed: &[JobStatus], action: &str) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(ScanError::Conflict(format!(
                "cannot {} scan {}: it is {}",
                action, self.scan_id, self.status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::validate_target;

    fn job() -> ScanJob {
        ScanJob::new("alice", &validate_target("example.com").unwrap(), ScanMode::Quick)
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert_eq!(job.target, "https://example.com/");
        assert_eq!(job.target_kind, TargetKind::Url);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_happy_path() {
        let mut job = job();
        job.start().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());

        assert!(job.record_progress(40, Some("reconnaissance"), Some(30)).unwrap());
        assert_eq!(job.current_stage.as_deref(), Some("reconnaissance"));
        assert_eq!(job.eta_seconds, Some(30));

        job.complete().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.eta_seconds.is_none());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let mut job = job();
        job.start().unwrap();
        job.record_progress(50, None, None).unwrap();
        assert!(!job.record_progress(20, None, None).unwrap());
        assert_eq!(job.progress, 50);
        job.record_progress(100, None, None).unwrap();
        assert_eq!(job.progress, MAX_RUNNING_PROGRESS);
    }

    #[test]
    fn test_progress_requires_running() {
        let mut job = job();
        assert!(matches!(
            job.record_progress(10, None, None),
            Err(ScanError::Conflict(_))
        ));
    }

    #[test]
    fn test_fail_preserves_progress() {
        let mut job = job();
        job.start().unwrap();
        job.record_progress(33, None, None).unwrap();
        job.fail("connection refused").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 33);
        assert_eq!(job.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_cancel_from_queued_and_running() {
        let mut queued = job();
        queued.cancel().unwrap();
        assert_eq!(queued.status, JobStatus::Canceled);

        let mut running = job();
        running.start().unwrap();
        running.cancel().unwrap();
        assert_eq!(running.status, JobStatus::Canceled);
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        let mut done = job();
        done.start().unwrap();
        done.complete().unwrap();

        assert!(matches!(done.cancel(), Err(ScanError::Conflict(_))));
        assert!(matches!(done.fail("late"), Err(ScanError::Conflict(_))));
        assert!(matches!(done.start(), Err(ScanError::Conflict(_))));
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);

        let mut canceled = job();
        canceled.cancel().unwrap();
        assert!(matches!(canceled.start(), Err(ScanError::Conflict(_))));
        assert!(matches!(canceled.cancel(), Err(ScanError::Conflict(_))));
    }

    #[test]
    fn test_queued_job_cannot_complete() {
        let mut job = job();
        assert!(job.complete().is_err());
        assert_eq!(job.status, JobStatus::Queued);
    }
}
