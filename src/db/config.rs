// Database Configuration
// Handles PostgreSQL and SQLite database configuration

use crate::ScanError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Database type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Postgres,
    Sqlite,
}

/// Database configuration, the `[database]` table of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub db_type: DatabaseType,

    // PostgreSQL settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,

    // SQLite settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn missing(what: &str) -> ScanError {
    ScanError::Config {
        message: format!("database: missing {}", what),
    }
}

impl DatabaseConfig {
    /// Create PostgreSQL configuration
    pub fn postgres(
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
    ) -> Self {
        Self {
            db_type: DatabaseType::Postgres,
            host: Some(host),
            port: Some(port),
            database: Some(database),
            username: Some(username),
            password: Some(password),
            max_connections: Some(10),
            path: None,
        }
    }

    /// Create SQLite configuration
    pub fn sqlite(path: PathBuf) -> Self {
        Self {
            db_type: DatabaseType::Sqlite,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            max_connections: None,
            path: Some(path),
        }
    }

    /// Parse a `--database` value: a `postgres://` URL, or a SQLite file
    /// path (optionally prefixed with `sqlite:`)
    pub fn from_url(value: &str) -> crate::Result<Self> {
        let value = value.trim();
        if value.starts_with("postgres://") || value.starts_with("postgresql://") {
            let url = url::Url::parse(value).map_err(|e| ScanError::Config {
                message: format!("database: invalid URL: {}", e),
            })?;
            let database = url.path().trim_start_matches('/');
            if database.is_empty() {
                return Err(missing("database name"));
            }

            return Ok(Self::postgres(
                url.host_str().ok_or_else(|| missing("PostgreSQL host"))?.to_string(),
                url.port().unwrap_or(5432),
                database.to_string(),
                url.username().to_string(),
                url.password().unwrap_or_default().to_string(),
            ));
        }

        let path = value
            .strip_prefix("sqlite://")
            .or_else(|| value.strip_prefix("sqlite:"))
            .unwrap_or(value);
        if path.is_empty() {
            return Err(missing("SQLite path"));
        }
        Ok(Self::sqlite(PathBuf::from(path)))
    }

    /// Whether this is an in-process SQLite database
    pub fn is_sqlite_memory(&self) -> bool {
        self.db_type == DatabaseType::Sqlite
            && self
                .path
                .as_ref()
                .map_or(false, |p| p.to_string_lossy() == ":memory:")
    }

    /// Generate database URL for sqlx
    pub fn connection_string(&self) -> crate::Result<String> {
        match self.db_type {
            DatabaseType::Postgres => {
                let host = self.host.as_ref().ok_or_else(|| missing("PostgreSQL host"))?;
                let port = self.port.ok_or_else(|| missing("PostgreSQL port"))?;
                let database = self.database.as_ref().ok_or_else(|| missing("database name"))?;
                let username = self.username.as_ref().ok_or_else(|| missing("username"))?;
                let password = self.password.as_ref().ok_or_else(|| missing("password"))?;

                Ok(format!(
                    "postgres://{}:{}@{}:{}/{}",
                    username, password, host, port, database
                ))
            }
            DatabaseType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| missing("SQLite path"))?;

                let path_str = path.to_string_lossy();
                if path_str == ":memory:" {
                    Ok(format!("sqlite:{}", path_str))
                } else if path_str.starts_with('/') {
                    Ok(format!("sqlite://{}", path.display()))
                } else {
                    Ok(format!("sqlite:{}", path.display()))
                }
            }
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::sqlite(PathBuf::from("vulnscan.db"))
    }
}
