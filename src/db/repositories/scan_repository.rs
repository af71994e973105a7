// Scan Repository Implementation
// SQL-backed scan store for PostgreSQL and SQLite

use crate::db::config::DatabaseType;
use crate::db::connection::{BindValue, DatabasePool, Statement};
use crate::db::models::{FindingRecord, ScanJobRecord};
use crate::db::traits::{HistoryQuery, ScanStore};
use crate::findings::Finding;
use crate::jobs::{JobStatus, ScanId, ScanJob};
use crate::ScanError;
use async_trait::async_trait;

const SCAN_COLUMNS: &str = "seq, scan_id, owner, target, target_kind, mode, status, progress, \
     current_stage, created_at, started_at, finished_at, eta_seconds, error";

const FINDING_COLUMNS: &str = "scan_id, ordinal, finding_id, severity, name, path, description, \
     impact, remediation, reference_links, status, evidence";

/// Findings inserted per statement, keeps well under SQLite's bind limit
const FINDING_BATCH: usize = 50;

pub struct SqlScanStore {
    pool: DatabasePool,
}

impl SqlScanStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Compare-and-set update of every mutable column
    fn update_statement(&self, expected: JobStatus, job: &ScanJob) -> Statement {
        let record = ScanJobRecord::from_job(job);
        let sql = self.pool.query_builder().sql(
            "UPDATE scans SET status = ?, progress = ?, current_stage = ?, started_at = ?, \
             finished_at = ?, eta_seconds = ?, error = ? \
             WHERE scan_id = ? AND status = ? AND progress <= ?",
        );
        (
            sql,
            vec![
                record.status.into(),
                record.progress.into(),
                record.current_stage.into(),
                record.started_at.into(),
                record.finished_at.into(),
                record.eta_seconds.into(),
                record.error.into(),
                record.scan_id.into(),
                expected.as_str().into(),
                record.progress.into(),
            ],
        )
    }

    /// Explain why a compare-and-set matched no row
    async fn cas_failure(&self, expected: JobStatus, job: &ScanJob) -> ScanError {
        match self.get_job(None, &job.scan_id).await {
            Ok(Some(stored)) if stored.status != expected => ScanError::Conflict(format!(
                "scan {} is {}, expected {}",
                job.scan_id, stored.status, expected
            )),
            Ok(Some(stored)) => ScanError::Conflict(format!(
                "scan {} progress would move backwards ({} -> {})",
                job.scan_id, stored.progress, job.progress
            )),
            Ok(None) => ScanError::NotFound(format!("Scan {}", job.scan_id)),
            Err(e) => e,
        }
    }

    fn finding_inserts(&self, scan_id: &ScanId, findings: &[Finding]) -> crate::Result<Vec<Statement>> {
        let records = findings
            .iter()
            .enumerate()
            .map(|(i, f)| FindingRecord::from_finding(scan_id, i, f))
            .collect::<crate::Result<Vec<_>>>()?;

        let mut statements = Vec::new();
        for chunk in records.chunks(FINDING_BATCH) {
            let sql = self.pool.query_builder().batch_insert_query(
                "findings",
                &FindingRecord::COLUMNS,
                chunk.len(),
            );
            let mut bindings = Vec::with_capacity(chunk.len() * FindingRecord::COLUMNS.len());
            for record in chunk.iter().cloned() {
                let row: [BindValue; 12] = [
                    record.scan_id.into(),
                    record.ordinal.into(),
                    record.finding_id.into(),
                    record.severity.into(),
                    record.name.into(),
                    record.path.into(),
                    record.description.into(),
                    record.impact.into(),
                    record.remediation.into(),
                    record.reference_links.into(),
                    record.status.into(),
                    BindValue::OptString(record.evidence),
                ];
                bindings.extend(row);
            }
            statements.push((sql, bindings));
        }
        Ok(statements)
    }
}

#[async_trait]
impl ScanStore for SqlScanStore {
    fn backend(&self) -> &'static str {
        match self.pool.db_type() {
            DatabaseType::Postgres => "postgres",
            DatabaseType::Sqlite => "sqlite",
        }
    }

    async fn ping(&self) -> crate::Result<()> {
        self.pool.execute("SELECT 1", Vec::new()).await?;
        Ok(())
    }

    async fn insert_job(&self, job: &ScanJob) -> crate::Result<()> {
        let record = ScanJobRecord::from_job(job);
        let sql = self.pool.query_builder().insert_query(
            "scans",
            &[
                "scan_id",
                "owner",
                "target",
                "target_kind",
                "mode",
                "status",
                "progress",
                "current_stage",
                "created_at",
                "started_at",
                "finished_at",
                "eta_seconds",
                "error",
            ],
        );

        self.pool
            .execute(
                &sql,
                vec![
                    record.scan_id.into(),
                    record.owner.into(),
                    record.target.into(),
                    record.target_kind.into(),
                    record.mode.into(),
                    record.status.into(),
                    record.progress.into(),
                    record.current_stage.into(),
                    record.created_at.into(),
                    record.started_at.into(),
                    record.finished_at.into(),
                    record.eta_seconds.into(),
                    record.error.into(),
                ],
            )
            .await
            .map_err(|e| ScanError::Database(format!("Failed to insert scan: {}", e)))?;
        Ok(())
    }

    async fn get_job(&self, owner: Option<&str>, id: &ScanId) -> crate::Result<Option<ScanJob>> {
        let mut sql = format!("SELECT {} FROM scans WHERE scan_id = ?", SCAN_COLUMNS);
        let mut bindings: Vec<BindValue> = vec![id.as_str().into()];
        if let Some(owner) = owner {
            sql.push_str(" AND owner = ?");
            bindings.push(owner.into());
        }

        let sql = self.pool.query_builder().sql(&sql);
        self.pool
            .fetch_optional::<ScanJobRecord>(&sql, bindings)
            .await?
            .map(ScanJobRecord::into_job)
            .transpose()
    }

    async fn list_jobs(&self, query: &HistoryQuery) -> crate::Result<Vec<ScanJob>> {
        let mut sql = format!("SELECT {} FROM scans WHERE owner = ?", SCAN_COLUMNS);
        let mut bindings: Vec<BindValue> = vec![query.owner.as_str().into()];
        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            bindings.push(status.as_str().into());
        }
        if let Some(mode) = query.mode {
            sql.push_str(" AND mode = ?");
            bindings.push(mode.as_str().into());
        }
        sql.push_str(" ORDER BY created_at DESC, seq DESC LIMIT ? OFFSET ?");
        bindings.push(BindValue::Int64(query.limit as i64));
        bindings.push(BindValue::Int64(query.offset as i64));

        let sql = self.pool.query_builder().sql(&sql);
        self.pool
            .fetch_all::<ScanJobRecord>(&sql, bindings)
            .await?
            .into_iter()
            .map(ScanJobRecord::into_job)
            .collect()
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> crate::Result<Vec<ScanJob>> {
        let sql = self.pool.query_builder().sql(&format!(
            "SELECT {} FROM scans WHERE status = ? ORDER BY created_at ASC, seq ASC",
            SCAN_COLUMNS
        ));
        self.pool
            .fetch_all::<ScanJobRecord>(&sql, vec![status.as_str().into()])
            .await?
            .into_iter()
            .map(ScanJobRecord::into_job)
            .collect()
    }

    async fn save_job(&self, expected: JobStatus, job: &ScanJob) -> crate::Result<()> {
        let (sql, bindings) = self.update_statement(expected, job);
        if self.pool.execute(&sql, bindings).await? == 0 {
            return Err(self.cas_failure(expected, job).await);
        }
        Ok(())
    }

    async fn complete_job(&self, job: &ScanJob, findings: &[Finding]) -> crate::Result<()> {
        if job.status != JobStatus::Completed {
            return Err(ScanError::Conflict(format!(
                "scan {} is {}, not completed",
                job.scan_id, job.status
            )));
        }

        let guard = self.update_statement(JobStatus::Running, job);
        let mut rest = vec![(
            self.pool
                .query_builder()
                .sql("DELETE FROM findings WHERE scan_id = ?"),
            vec![job.scan_id.as_str().into()],
        )];
        rest.extend(self.finding_inserts(&job.scan_id, findings)?);

        if !self.pool.execute_guarded(guard, rest).await? {
            return Err(self.cas_failure(JobStatus::Running, job).await);
        }
        Ok(())
    }

    async fn findings(&self, id: &ScanId) -> crate::Result<Vec<Finding>> {
        let sql = self.pool.query_builder().sql(&format!(
            "SELECT {} FROM findings WHERE scan_id = ? ORDER BY ordinal ASC",
            FINDING_COLUMNS
        ));
        self.pool
            .fetch_all::<FindingRecord>(&sql, vec![id.as_str().into()])
            .await?
            .into_iter()
            .map(FindingRecord::into_finding)
            .collect()
    }

    async fn delete_job(&self, owner: &str, id: &ScanId) -> crate::Result<bool> {
        let mut qb = self.pool.query_builder();
        let guard = (
            qb.sql("DELETE FROM scans WHERE scan_id = ? AND owner = ?"),
            vec![id.as_str().into(), owner.into()],
        );
        // Not every SQLite connection enforces ON DELETE CASCADE
        let rest = vec![(
            qb.sql("DELETE FROM findings WHERE scan_id = ?"),
            vec![id.as_str().into()],
        )];
        self.pool.execute_guarded(guard, rest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::config::DatabaseConfig;
    use crate::db::migrations::run_migrations;
    use crate::db::store_tests;
    use std::path::PathBuf;

    async fn memory_store() -> SqlScanStore {
        let config = DatabaseConfig::sqlite(PathBuf::from(":memory:"));
        let pool = DatabasePool::new(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqlScanStore::new(pool)
    }

    #[tokio::test]
    async fn test_sqlite_store_contract() {
        let store = memory_store().await;
        store_tests::run_all(&store).await;
        store.pool().close().await;
    }

    #[tokio::test]
    async fn test_sqlite_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::sqlite(dir.path().join("scans.db"));

        let job = ScanJob::new(
            "owner",
            &crate::target::validate_target("example.com").unwrap(),
            crate::jobs::ScanMode::Quick,
        );
        {
            let pool = DatabasePool::new(&config).await.unwrap();
            run_migrations(&pool).await.unwrap();
            SqlScanStore::new(pool.clone()).insert_job(&job).await.unwrap();
            pool.close().await;
        }

        let pool = DatabasePool::new(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = SqlScanStore::new(pool);
        assert_eq!(store.get_job(None, &job.scan_id).await.unwrap(), Some(job));
        store.pool().close().await;
    }
}
