// In-memory Scan Store
// Used when no database is configured and in tests

use crate::db::traits::{HistoryQuery, ScanStore};
use crate::findings::Finding;
use crate::jobs::{JobStatus, ScanId, ScanJob};
use crate::ScanError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct StoredJob {
    seq: u64,
    job: ScanJob,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<ScanId, StoredJob>,
    findings: HashMap<ScanId, Vec<Finding>>,
    next_seq: u64,
}

/// In-memory scan store implementation
#[derive(Default)]
pub struct InMemoryScanStore {
    inner: RwLock<Inner>,
}

impl InMemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_cas(stored: &ScanJob, expected: JobStatus, job: &ScanJob) -> crate::Result<()> {
    if stored.status != expected {
        return Err(ScanError::Conflict(format!(
            "scan {} is {}, expected {}",
            job.scan_id, stored.status, expected
        )));
    }
    if stored.progress > job.progress {
        return Err(ScanError::Conflict(format!(
            "scan {} progress would move backwards ({} -> {})",
            job.scan_id, stored.progress, job.progress
        )));
    }
    Ok(())
}

#[async_trait]
impl ScanStore for InMemoryScanStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_job(&self, job: &ScanJob) -> crate::Result<()> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&job.scan_id) {
            return Err(ScanError::Conflict(format!("scan {} already exists", job.scan_id)));
        }
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.jobs.insert(
            job.scan_id.clone(),
            StoredJob {
                seq,
                job: job.clone(),
            },
        );
        Ok(())
    }

    async fn get_job(&self, owner: Option<&str>, id: &ScanId) -> crate::Result<Option<ScanJob>> {
        let inner = self.inner.read().await;
        Ok(inner
            .jobs
            .get(id)
            .filter(|stored| owner.map_or(true, |o| stored.job.owner == o))
            .map(|stored| stored.job.clone()))
    }

    async fn list_jobs(&self, query: &HistoryQuery) -> crate::Result<Vec<ScanJob>> {
        let inner = self.inner.read().await;
        let mut matching: Vec<&StoredJob> = inner
            .jobs
            .values()
            .filter(|s| s.job.owner == query.owner)
            .filter(|s| query.status.map_or(true, |st| s.job.status == st))
            .filter(|s| query.mode.map_or(true, |m| s.job.mode == m))
            .collect();

        matching.sort_by(|a, b| {
            b.job
                .created_at
                .cmp(&a.job.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        Ok(matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|s| s.job.clone())
            .collect())
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> crate::Result<Vec<ScanJob>> {
        let inner = self.inner.read().await;
        let mut matching: Vec<&StoredJob> = inner
            .jobs
            .values()
            .filter(|s| s.job.status == status)
            .collect();
        matching.sort_by(|a, b| a.job.created_at.cmp(&b.job.created_at).then(a.seq.cmp(&b.seq)));
        Ok(matching.into_iter().map(|s| s.job.clone()).collect())
    }

    async fn save_job(&self, expected: JobStatus, job: &ScanJob) -> crate::Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .jobs
            .get_mut(&job.scan_id)
            .ok_or_else(|| ScanError::NotFound(format!("Scan {}", job.scan_id)))?;
        check_cas(&stored.job, expected, job)?;
        stored.job = job.clone();
        Ok(())
    }

    async fn complete_job(&self, job: &ScanJob, findings: &[Finding]) -> crate::Result<()> {
        if job.status != JobStatus::Completed {
            return Err(ScanError::Conflict(format!(
                "scan {} is {}, not completed",
                job.scan_id, job.status
            )));
        }

        let mut inner = self.inner.write().await;
        let stored = inner
            .jobs
            .get_mut(&job.scan_id)
            .ok_or_else(|| ScanError::NotFound(format!("Scan {}", job.scan_id)))?;
        check_cas(&stored.job, JobStatus::Running, job)?;
        stored.job = job.clone();
        inner.findings.insert(job.scan_id.clone(), findings.to_vec());
        Ok(())
    }

    async fn findings(&self, id: &ScanId) -> crate::Result<Vec<Finding>> {
        let inner = self.inner.read().await;
        Ok(inner.findings.get(id).cloned().unwrap_or_default())
    }

    async fn delete_job(&self, owner: &str, id: &ScanId) -> crate::Result<bool> {
        let mut inner = self.inner.write().await;
        let owned = inner.jobs.get(id).map_or(false, |s| s.job.owner == owner);
        if !owned {
            return Ok(false);
        }
        inner.jobs.remove(id);
        inner.findings.remove(id);
        Ok(true)
    }
}
