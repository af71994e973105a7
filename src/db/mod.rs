// Database Module
// Scan job persistence: an in-memory store and a SQL store (PostgreSQL or SQLite)

pub mod config;
pub mod connection;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod repositories;
pub mod traits;


// Re-exports
pub use config::{DatabaseConfig, DatabaseType};
pub use connection::DatabasePool;
pub use memory::InMemoryScanStore;
pub use migrations::run_migrations;
pub use repositories::SqlScanStore;
pub use traits::*;

use std::sync::Arc;
use tracing::info;

/// Open the configured store. Without a database section, jobs live in memory
/// and are lost on restart.
pub async fn open_store(config: Option<&DatabaseConfig>) -> crate::Result<Arc<dyn ScanStore>> {
    match config {
        Some(config) => {
            let pool = DatabasePool::new(config).await?;
            run_migrations(&pool).await?;
            info!("Using {:?} scan store", pool.db_type());
            Ok(Arc::new(SqlScanStore::new(pool)))
        }
        None => {
            info!("No database configured, scan jobs are kept in memory");
            Ok(Arc::new(InMemoryScanStore::new()))
        }
    }
}
