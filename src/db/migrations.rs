// Database Migrations
// Embedded SQL migrations for both PostgreSQL and SQLite

use crate::db::config::DatabaseType;
use crate::db::connection::{BindValue, DatabasePool};
use crate::ScanError;
use sqlx::FromRow;
use tracing::info;

struct Migration {
    version: i64,
    description: &'static str,
    sql: &'static str,
}

const SQLITE_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_scans",
        sql: include_str!("../../migrations/sqlite/0001_create_scans.sql"),
    },
    Migration {
        version: 2,
        description: "create_findings",
        sql: include_str!("../../migrations/sqlite/0002_create_findings.sql"),
    },
];

const POSTGRES_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_scans",
        sql: include_str!("../../migrations/postgres/0001_create_scans.sql"),
    },
    Migration {
        version: 2,
        description: "create_findings",
        sql: include_str!("../../migrations/postgres/0002_create_findings.sql"),
    },
];

#[derive(FromRow)]
struct AppliedMigration {
    version: i64,
}

/// Run database migrations that have not been applied yet
pub async fn run_migrations(pool: &DatabasePool) -> crate::Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version BIGINT PRIMARY KEY,
            description TEXT NOT NULL,
            installed_on BIGINT NOT NULL
        )
        "#,
        Vec::new(),
    )
    .await
    .map_err(|e| ScanError::Database(format!("Failed to create migrations table: {}", e)))?;

    let applied: Vec<AppliedMigration> = pool
        .fetch_all("SELECT version FROM schema_migrations", Vec::new())
        .await?;

    let migrations = match pool.db_type() {
        DatabaseType::Sqlite => SQLITE_MIGRATIONS,
        DatabaseType::Postgres => POSTGRES_MIGRATIONS,
    };

    for migration in migrations {
        if applied.iter().any(|a| a.version == migration.version) {
            continue;
        }

        for statement in migration.sql.split(';').filter(|s| !s.trim().is_empty()) {
            pool.execute(statement, Vec::new()).await.map_err(|e| {
                ScanError::Database(format!(
                    "Failed to execute migration {:04}_{}: {}",
                    migration.version, migration.description, e
                ))
            })?;
        }

        let insert = pool.query_builder().insert_query(
            "schema_migrations",
            &["version", "description", "installed_on"],
        );
        pool.execute(
            &insert,
            vec![
                BindValue::Int64(migration.version),
                BindValue::from(migration.description),
                BindValue::Int64(chrono::Utc::now().timestamp_micros()),
            ],
        )
        .await?;

        info!(
            "Applied migration {:04}_{}",
            migration.version, migration.description
        );
    }

    Ok(())
}
