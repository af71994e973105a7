// Database Traits
// Defines the scan store interface shared by the in-memory and SQL backends

use crate::findings::Finding;
use crate::jobs::{JobStatus, ScanId, ScanJob, ScanMode};
use async_trait::async_trait;

/// Largest history page
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Default history page
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Filter and page for a user's scan history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub owner: String,
    pub status: Option<JobStatus>,
    pub mode: Option<ScanMode>,
    pub limit: usize,
    pub offset: usize,
}

impl HistoryQuery {
    /// First page of an owner's history
    pub fn for_owner(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            status: None,
            mode: None,
            limit: DEFAULT_HISTORY_LIMIT,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the page; the limit is clamped to 1..=100
    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        self.offset = offset;
        self
    }
}

/// Scan store trait
///
/// The store is the single source of truth for job state. Writes to a job
/// go through `save_job`/`complete_job`, both compare-and-set on the stored
/// status, which is what serializes the runner against concurrent cancels.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Insert a newly created job
    async fn insert_job(&self, job: &ScanJob) -> crate::Result<()>;

    /// Get job by ID, restricted to `owner` when given
    async fn get_job(&self, owner: Option<&str>, id: &ScanId) -> crate::Result<Option<ScanJob>>;

    /// Owner's jobs, newest first (ties broken by insertion order, newest first)
    async fn list_jobs(&self, query: &HistoryQuery) -> crate::Result<Vec<ScanJob>>;

    /// All jobs in a status, oldest first
    async fn list_jobs_by_status(&self, status: JobStatus) -> crate::Result<Vec<ScanJob>>;

    /// Overwrite the job if its stored status is still `expected` and its
    /// stored progress does not exceed the new one. `Conflict` otherwise,
    /// `NotFound` if the job does not exist.
    async fn save_job(&self, expected: JobStatus, job: &ScanJob) -> crate::Result<()>;

    /// Move a running job to completed and store its findings atomically
    async fn complete_job(&self, job: &ScanJob, findings: &[Finding]) -> crate::Result<()>;

    /// Findings of a job, in classification order
    async fn findings(&self, id: &ScanId) -> crate::Result<Vec<Finding>>;

    /// Delete a job and its findings; returns whether it existed
    async fn delete_job(&self, owner: &str, id: &ScanId) -> crate::Result<bool>;

    /// Backend name reported by the health check
    fn backend(&self) -> &'static str;

    /// Check the backend is reachable
    async fn ping(&self) -> crate::Result<()> {
        Ok(())
    }
}
