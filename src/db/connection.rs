// Database Connection Pool
// Manages PostgreSQL and SQLite connection pools with sqlx

use crate::db::config::{DatabaseConfig, DatabaseType};
use crate::ScanError;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Pool, Postgres, Sqlite};
use std::str::FromStr;
use std::time::Duration;

/// QueryBuilder that handles placeholder syntax differences between databases.
/// PostgreSQL uses $1, $2, $3... while SQLite uses ?, ?, ?...
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    db_type: DatabaseType,
    param_count: usize,
}

impl QueryBuilder {
    /// Create a new query builder for the given database type
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            param_count: 0,
        }
    }

    /// Get the next placeholder for the current database type
    pub fn placeholder(&mut self) -> String {
        self.param_count += 1;
        match self.db_type {
            DatabaseType::Postgres => format!("${}", self.param_count),
            DatabaseType::Sqlite => "?".to_string(),
        }
    }

    /// Generate N placeholders separated by commas
    pub fn placeholders(&mut self, count: usize) -> String {
        (0..count)
            .map(|_| self.placeholder())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Reset the placeholder counter
    pub fn reset(&mut self) {
        self.param_count = 0;
    }

    /// Rewrite a query written with `?` placeholders for this database
    pub fn sql(&mut self, template: &str) -> String {
        self.reset();
        let mut out = String::with_capacity(template.len() + 8);
        for c in template.chars() {
            if c == '?' {
                out.push_str(&self.placeholder());
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Build an INSERT query with the correct placeholders
    pub fn insert_query(&mut self, table: &str, columns: &[&str]) -> String {
        self.reset();
        let cols = columns.join(", ");
        let placeholders = self.placeholders(columns.len());
        format!("INSERT INTO {} ({}) VALUES ({})", table, cols, placeholders)
    }

    /// Build a batch INSERT query with multiple VALUES clauses
    pub fn batch_insert_query(
        &mut self,
        table: &str,
        columns: &[&str],
        row_count: usize,
    ) -> String {
        self.reset();
        let cols = columns.join(", ");

        let value_sets: Vec<String> = (0..row_count)
            .map(|_| format!("({})", self.placeholders(columns.len())))
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            cols,
            value_sets.join(", ")
        )
    }
}

/// A statement and its bind values
pub type Statement = (String, Vec<BindValue>);

/// Database pool enum supporting both PostgreSQL and SQLite
#[derive(Clone)]
pub enum DatabasePool {
    Postgres(Pool<Postgres>),
    Sqlite(Pool<Sqlite>),
}

impl DatabasePool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> crate::Result<Self> {
        let connection_string = config.connection_string()?;

        let pool = match config.db_type {
            DatabaseType::Postgres => {
                let max_connections = config.max_connections.unwrap_or(10);

                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(Duration::from_secs(30))
                    .connect(&connection_string)
                    .await
                    .map_err(|e| {
                        ScanError::Database(format!("PostgreSQL connection failed: {}", e))
                    })?;

                DatabasePool::Postgres(pool)
            }
            DatabaseType::Sqlite => {
                let connect_options =
                    sqlx::sqlite::SqliteConnectOptions::from_str(&connection_string)
                        .map_err(|e| {
                            ScanError::Database(format!(
                                "Failed to parse SQLite connection string: {}",
                                e
                            ))
                        })?
                        .create_if_missing(true);

                let mut options = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(1) // SQLite is single-writer
                    .acquire_timeout(Duration::from_secs(30));

                // An in-memory database lives exactly as long as its one connection
                if config.is_sqlite_memory() {
                    options = options.idle_timeout(None).max_lifetime(None);
                }

                let pool = options.connect_with(connect_options).await.map_err(|e| {
                    ScanError::Database(format!("SQLite connection failed: {}", e))
                })?;

                DatabasePool::Sqlite(pool)
            }
        };

        Ok(pool)
    }

    /// Get database type
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DatabasePool::Postgres(_) => DatabaseType::Postgres,
            DatabasePool::Sqlite(_) => DatabaseType::Sqlite,
        }
    }

    /// Close the connection pool
    pub async fn close(&self) {
        match self {
            DatabasePool::Postgres(pool) => pool.close().await,
            DatabasePool::Sqlite(pool) => pool.close().await,
        }
    }

    /// Create a QueryBuilder for this pool's database type
    pub fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.db_type())
    }

    /// Execute a statement, returning the number of affected rows
    pub async fn execute(&self, query: &str, bindings: Vec<BindValue>) -> crate::Result<u64> {
        let affected = match self {
            DatabasePool::Postgres(pool) => {
                let mut q = sqlx::query(query);
                for binding in bindings {
                    q = binding.bind_postgres(q);
                }
                q.execute(pool)
                    .await
                    .map_err(|e| ScanError::Database(format!("Query failed: {}", e)))?
                    .rows_affected()
            }
            DatabasePool::Sqlite(pool) => {
                let mut q = sqlx::query(query);
                for binding in bindings {
                    q = binding.bind_sqlite(q);
                }
                q.execute(pool)
                    .await
                    .map_err(|e| ScanError::Database(format!("Query failed: {}", e)))?
                    .rows_affected()
            }
        };
        Ok(affected)
    }

    /// Execute a SELECT and map every row
    pub async fn fetch_all<T>(&self, query: &str, bindings: Vec<BindValue>) -> crate::Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        match self {
            DatabasePool::Postgres(pool) => {
                let mut q = sqlx::query(query);
                for binding in bindings {
                    q = binding.bind_postgres(q);
                }
                let rows = q
                    .fetch_all(pool)
                    .await
                    .map_err(|e| ScanError::Database(format!("Query failed: {}", e)))?;
                rows.iter()
                    .map(|row| <T as FromRow<'_, PgRow>>::from_row(row).map_err(ScanError::from))
                    .collect()
            }
            DatabasePool::Sqlite(pool) => {
                let mut q = sqlx::query(query);
                for binding in bindings {
                    q = binding.bind_sqlite(q);
                }
                let rows = q
                    .fetch_all(pool)
                    .await
                    .map_err(|e| ScanError::Database(format!("Query failed: {}", e)))?;
                rows.iter()
                    .map(|row| {
                        <T as FromRow<'_, SqliteRow>>::from_row(row).map_err(ScanError::from)
                    })
                    .collect()
            }
        }
    }

    /// Execute a SELECT expected to return at most one row
    pub async fn fetch_optional<T>(
        &self,
        query: &str,
        bindings: Vec<BindValue>,
    ) -> crate::Result<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        Ok(self.fetch_all(query, bindings).await?.into_iter().next())
    }

    /// Run `guard` and then `rest` in one transaction. When the guard
    /// affects no rows the transaction is rolled back and `false` returned.
    pub async fn execute_guarded(
        &self,
        guard: Statement,
        rest: Vec<Statement>,
    ) -> crate::Result<bool> {
        match self {
            DatabasePool::Postgres(pool) => {
                let mut tx = pool.begin().await?;

                let (sql, bindings) = guard;
                let mut q = sqlx::query(&sql);
                for binding in bindings {
                    q = binding.bind_postgres(q);
                }
                if q.execute(&mut *tx).await?.rows_affected() == 0 {
                    tx.rollback().await?;
                    return Ok(false);
                }

                for (sql, bindings) in rest {
                    let mut q = sqlx::query(&sql);
                    for binding in bindings {
                        q = binding.bind_postgres(q);
                    }
                    q.execute(&mut *tx).await?;
                }

                tx.commit().await?;
            }
            DatabasePool::Sqlite(pool) => {
                let mut tx = pool.begin().await?;

                let (sql, bindings) = guard;
                let mut q = sqlx::query(&sql);
                for binding in bindings {
                    q = binding.bind_sqlite(q);
                }
                if q.execute(&mut *tx).await?.rows_affected() == 0 {
                    tx.rollback().await?;
                    return Ok(false);
                }

                for (sql, bindings) in rest {
                    let mut q = sqlx::query(&sql);
                    for binding in bindings {
                        q = binding.bind_sqlite(q);
                    }
                    q.execute(&mut *tx).await?;
                }

                tx.commit().await?;
            }
        }
        Ok(true)
    }
}

/// Enum to hold different bind value types for database-agnostic query binding
#[derive(Debug, Clone)]
pub enum BindValue {
    Int64(i64),
    Int32(i32),
    String(String),
    OptInt64(Option<i64>),
    OptString(Option<String>),
}

impl BindValue {
    /// Bind this value to a Postgres query
    fn bind_postgres<'q>(
        self,
        query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    ) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
        match self {
            BindValue::Int64(v) => query.bind(v),
            BindValue::Int32(v) => query.bind(v),
            BindValue::String(v) => query.bind(v),
            BindValue::OptInt64(v) => query.bind(v),
            BindValue::OptString(v) => query.bind(v),
        }
    }

    /// Bind this value to a SQLite query
    fn bind_sqlite<'q>(
        self,
        query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        match self {
            BindValue::Int64(v) => query.bind(v),
            BindValue::Int32(v) => query.bind(v),
            BindValue::String(v) => query.bind(v),
            BindValue::OptInt64(v) => query.bind(v),
            BindValue::OptString(v) => query.bind(v),
        }
    }
}

impl From<&str> for BindValue {
    fn from(v: &str) -> Self {
        BindValue::String(v.to_string())
    }
}

impl From<String> for BindValue {
    fn from(v: String) -> Self {
        BindValue::String(v)
    }
}

impl From<i64> for BindValue {
    fn from(v: i64) -> Self {
        BindValue::Int64(v)
    }
}

impl From<i32> for BindValue {
    fn from(v: i32) -> Self {
        BindValue::Int32(v)
    }
}

impl From<Option<i64>> for BindValue {
    fn from(v: Option<i64>) -> Self {
        BindValue::OptInt64(v)
    }
}

impl From<Option<String>> for BindValue {
    fn from(v: Option<String>) -> Self {
        BindValue::OptString(v)
    }
}
